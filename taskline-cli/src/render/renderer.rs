use super::theme::OneDark;
use taskline_core::{ParseResult, TaskFields, TimeRangeOrderError};
use termimad::{MadSkin, crossterm::style::Stylize};

#[derive(Clone)]
pub struct RenderOptions {
    pub use_color: bool,
    pub short_mode: bool,
}

pub struct Renderer {
    skin: MadSkin,
    opts: RenderOptions,
}

impl Renderer {
    pub fn new(config: Option<RenderOptions>) -> Self {
        Self {
            skin: OneDark::result_skin(),
            opts: config.unwrap_or(RenderOptions {
                use_color: true,
                short_mode: false,
            }),
        }
    }

    pub fn print_md(&self, md: &str) {
        if self.opts.use_color {
            self.skin.print_text(md);
        } else {
            print!("{md}");
        }
    }

    pub fn print_info(&self, message: &str) {
        if self.opts.use_color {
            let md = format!("|-|\n| {message} |\n|-|\n");
            self.skin.print_text(&md);
        } else {
            println!("{message}");
        }
    }

    /// Range-order errors go to stderr so stdout keeps only task lines.
    pub fn print_notice(&self, err: &TimeRangeOrderError) {
        let message = format!("notice: {err}");
        if self.opts.use_color {
            eprintln!("{}", message.with(OneDark::RED));
        } else {
            eprintln!("{message}");
        }
    }

    /// Plain line output, used for stamping and for echoing failed lines.
    pub fn print_line(&self, line: &str) {
        println!("{line}");
    }

    pub fn print_result_line(&self, result: &ParseResult) {
        let mut text = result.cleaned_text.clone();
        let mut summary = field_rows(&result.fields)
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");
        if self.opts.use_color {
            text = text.with(OneDark::YELLOW).to_string();
            summary = summary.with(OneDark::CYAN).to_string();
        }
        if summary.is_empty() {
            println!("{text}");
        } else {
            println!("{text}  {summary}");
        }
    }

    pub fn print_result(&self, result: &ParseResult) {
        if self.opts.short_mode {
            self.print_result_line(result);
            return;
        }

        let mut md = format!("## {}\n", result.cleaned_text.trim());
        let rows = field_rows(&result.fields);
        if rows.is_empty() {
            md.push_str("*no metadata*\n");
        }
        for (key, value) in rows {
            md.push_str(&format!("* **{key}** `{value}`\n"));
        }
        if !result.relocated_spans.is_empty() {
            let moved: Vec<&str> = result.relocated_spans.iter().map(|s| s.raw.trim()).collect();
            md.push_str(&format!("* *kept* {}\n", moved.join(" ")));
        }
        self.print_md(&md);
        self.print_md("---\n");
    }
}

fn field_rows(fields: &TaskFields) -> Vec<(String, String)> {
    let mut rows: Vec<(String, String)> = fields
        .dates
        .iter()
        .map(|(role, value)| (role.as_ref().to_string(), value.to_string()))
        .collect();
    if let Some(time) = fields.time {
        rows.push(("time".into(), time.to_string()));
    }
    if let Some(range) = fields.time_range {
        rows.push(("range".into(), range.to_string()));
    }
    if let Some(priority) = fields.priority {
        rows.push(("priority".into(), priority.as_ref().to_string()));
    }
    for (property, value) in &fields.properties {
        rows.push((property.as_ref().to_string(), value.clone()));
    }
    if !fields.tags.is_empty() {
        let tags: Vec<String> = fields.tags.iter().map(|t| format!("#{t}")).collect();
        rows.push(("tags".into(), tags.join(" ")));
    }
    for (key, value) in &fields.dataview {
        rows.push((key.clone(), value.clone()));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use taskline_core::{Engine, EngineConfig};

    #[test]
    fn field_rows_list_dates_first() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 1, 4).unwrap();
        let result = engine
            .parse("- [ ] pay rent tomorrow 9:00-10:00 #bills [owner:: me]", today)
            .unwrap();

        let rows = field_rows(&result.fields);
        let keys: Vec<&str> = rows.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["due", "range", "tags", "owner"]);
        assert_eq!(rows[0].1, "2025-01-05");
        assert_eq!(rows[2].1, "#bills");
    }

    #[test]
    fn field_rows_list_task_properties_after_priority() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 1, 4).unwrap();
        let result = engine
            .parse("- [ ] ship ⏫ 🔁 every week 🆔 s1 [due:: 2025-01-10]", today)
            .unwrap();

        let rows = field_rows(&result.fields);
        let keys: Vec<&str> = rows.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["due", "priority", "id", "repeat", "due"]);
        assert_eq!(rows[3].1, "every week");
    }
}

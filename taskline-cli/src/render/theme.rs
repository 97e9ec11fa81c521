use termimad::{
    MadSkin,
    crossterm::style::{Attribute, Color},
};

/// One Dark colors for the pieces a parse result is rendered with.
pub struct OneDark;

impl OneDark {
    /// `##` cleaned line, `*` field rows, **key** and `value`, *notes*.
    pub fn result_skin() -> MadSkin {
        let mut skin = MadSkin::default();

        skin.headers[1].set_fg(OneDark::YELLOW);
        skin.headers[1].add_attr(Attribute::Bold);
        skin.bullet.set_fg(OneDark::RED);
        skin.bold.set_fg(OneDark::BLUE);
        skin.inline_code.set_fg(OneDark::GREEN);
        skin.italic.set_fg(OneDark::COMMENT);
        skin.table.set_fg(OneDark::COMMENT);

        skin
    }

    pub const RED: Color = Color::Rgb {
        r: 0xE0,
        g: 0x6C,
        b: 0x75,
    }; // #E06C75
    pub const YELLOW: Color = Color::Rgb {
        r: 0xE5,
        g: 0xC0,
        b: 0x7B,
    }; // #E5C07B
    pub const GREEN: Color = Color::Rgb {
        r: 0x98,
        g: 0xC3,
        b: 0x79,
    }; // #98C379
    pub const BLUE: Color = Color::Rgb {
        r: 0x61,
        g: 0xAF,
        b: 0xEF,
    }; // #61AFEF
    pub const CYAN: Color = Color::Rgb {
        r: 0x56,
        g: 0xB6,
        b: 0xC2,
    }; // #56B6C2
    pub const COMMENT: Color = Color::Rgb {
        r: 0x5C,
        g: 0x63,
        b: 0x70,
    }; // #5C6370
}

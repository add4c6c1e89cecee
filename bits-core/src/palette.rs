//! Display helpers for child profiles: the color palette and initials for
//! avatar badges.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorToken {
    pub name: &'static str,
    pub value: &'static str,
}

pub const CHILD_COLORS: [ColorToken; 6] = [
    ColorToken { name: "Electric Blue", value: "hsl(211, 100%, 50%)" },
    ColorToken { name: "Cyan", value: "hsl(195, 100%, 45%)" },
    ColorToken { name: "Royal Blue", value: "hsl(230, 85%, 55%)" },
    ColorToken { name: "Teal", value: "hsl(180, 90%, 40%)" },
    ColorToken { name: "Sky Blue", value: "hsl(200, 95%, 48%)" },
    ColorToken { name: "Deep Blue", value: "hsl(220, 80%, 52%)" },
];

/// Color given to a child created without one.
pub const DEFAULT_COLOR: &str = CHILD_COLORS[0].value;

/// Look up the palette name of a stored color value.
pub fn color_name(value: &str) -> Option<&'static str> {
    CHILD_COLORS.iter().find(|c| c.value == value).map(|c| c.name)
}

/// First letter of at most the first two words, e.g. "Maya Rose Lin" -> "MR".
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}

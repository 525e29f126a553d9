use colored::Colorize;
use serde::{Serialize, Deserialize};

/// Prints the given string with the given color.
///
/// ## Example
/// ```
/// use trajopt::utils::utils_console::{trajopt_print, PrintMode, PrintColor};
/// trajopt_print("test", PrintMode::Print, PrintColor::Blue, false);
/// ```
pub fn trajopt_print(s: &str, mode: PrintMode, color: PrintColor, bolded: bool) {
    let mut string = match &color {
        PrintColor::None => { s.normal() }
        _ => {
            let c = color.get_color_triple();
            s.truecolor(c.0, c.1, c.2)
        }
    };
    if bolded { string = string.bold(); }
    match mode {
        PrintMode::Println => { println!("{}", string); }
        PrintMode::Print => { print!("{}", string); }
    }
}

pub fn trajopt_print_new_line() {
    trajopt_print("\n", PrintMode::Print, PrintColor::None, false);
}

/// Enum that is used in the trajopt_print function.
/// Println will cause a new line after each line, while Print will not.
#[derive(Clone, Debug)]
pub enum PrintMode {
    Println,
    Print
}

/// Defines color for a trajopt print command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrintColor {
    None,
    Blue,
    Green,
    Red,
    Yellow,
    Cyan,
    Magenta
}
impl PrintColor {
    pub fn get_color_triple(&self) -> (u8, u8, u8) {
        match self {
            PrintColor::None => { (0,0,0) }
            PrintColor::Blue => { return (0, 0, 255) }
            PrintColor::Green => { return (0, 255, 0) }
            PrintColor::Red => { return (255, 0, 0) }
            PrintColor::Yellow => { return (255, 255, 0) }
            PrintColor::Cyan => { return (0, 255, 255) }
            PrintColor::Magenta => { return (255, 0, 255) }
        }
    }
}

/// Controls optional progress printing inside long running calls (e.g., the nonlinear solver).
/// With `True { print_every }`, a progress line is printed every `print_every` evaluations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrajoptDebug {
    False,
    True { print_every: usize }
}
impl TrajoptDebug {
    pub fn should_print(&self, count: usize) -> bool {
        return match self {
            TrajoptDebug::False => { false }
            TrajoptDebug::True { print_every } => {
                *print_every > 0 && count % *print_every == 0
            }
        }
    }
}
impl Default for TrajoptDebug {
    fn default() -> Self { Self::False }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_prints_on_multiples_only() {
        let d = TrajoptDebug::True { print_every: 5 };
        assert!(d.should_print(10));
        assert!(!d.should_print(11));
        assert!(!TrajoptDebug::False.should_print(10));
        assert!(!TrajoptDebug::True { print_every: 0 }.should_print(10));
    }
}

use std::fmt::Display;

use crate::terminal::colors;
use crate::terminal::logging::PRINT_TARGET;
use colored::*;
use tracing::info;

pub const TOTAL_WIDTH: usize = 64;
const KEY_WIDTH: usize = 10;

#[macro_export]
macro_rules! mprint {
    () => {
        $crate::terminal::print::print("")
    };
    ($msg:expr) => {
        $crate::terminal::print::print($msg)
    };
}

/// Emits a line through the print target so progress bars stay intact.
pub fn print(msg: &str) {
    info!(target: PRINT_TARGET, raw_msg = msg);
}

const BANNER: &str = r#"
      ____  _  ___   ___      __
     |  _ \| |/ / \ | \ \    / /
     | | | | ' /|  \| |\ \/\/ /
     | |_| | . \| |\  | \    /
     |____/|_|\_\_| \_|  \/\/
"#;

const NO_RESULTS: &str = r#"
         _   _  ___ _____   _____ ___  _   _ _   _ ____
        | \ | |/ _ \_   _| |  ___/ _ \| | | | \ | |  _ \
        |  \| | | | || |   | |_ | | | | | | |  \| | | | |
        | |\  | |_| || |   |  _|| |_| | |_| | |\  | |_| |
        |_| \_|\___/ |_|   |_|   \___/ \___/|_| \_|____/
"#;

/// `label` centred in a `fill` line of [`TOTAL_WIDTH`] columns.
fn rule(label: ColoredString, fill: &str) -> String {
    let spare: usize = TOTAL_WIDTH.saturating_sub(console::measure_text_width(&label));
    let left: usize = spare / 2;
    format!(
        "{}{label}{}",
        fill.repeat(left).bright_black(),
        fill.repeat(spare - left).bright_black()
    )
}

pub fn banner(no_banner: bool, q_level: u8) {
    if no_banner || q_level > 0 {
        return;
    }
    let title: String = format!("⟦ DKNW v{} ⟧", env!("CARGO_PKG_VERSION"));

    print(&BANNER.color(colors::PRIMARY).bold().to_string());
    print(&rule(title.bright_green().bold(), "═"));
}

pub fn header(msg: &str, q_level: u8) {
    if q_level == 0 {
        let label: String = format!("⟦ {} ⟧", msg.to_uppercase());
        print(&rule(label.bright_green(), "─"));
    }
}

pub fn fat_separator() {
    print(&"═".repeat(TOTAL_WIDTH).bright_black().to_string());
}

/// `> key.......: value`
pub fn aligned_line(key: &str, value: impl Display) {
    let dots: String = ".".repeat((KEY_WIDTH + 1).saturating_sub(key.len()));
    print(&format!(
        "{} {}{}{} {}",
        ">".color(colors::SEPARATOR),
        key.color(colors::PRIMARY),
        dots.color(colors::SEPARATOR),
        ":".color(colors::SEPARATOR),
        value.to_string().color(colors::TEXT_DEFAULT)
    ));
}

pub fn tree_head(idx: usize, name: &str) {
    print(&format!(
        "{}{}{} {}",
        "[".color(colors::SEPARATOR),
        idx.to_string().color(colors::ACCENT),
        "]".color(colors::SEPARATOR),
        name.color(colors::PRIMARY)
    ));
}

pub fn as_tree_one_level(rows: Vec<(String, ColoredString)>) {
    let last: usize = rows.len().saturating_sub(1);
    for (i, (key, value)) in rows.into_iter().enumerate() {
        let branch: &str = if i == last { "└─" } else { "├─" };
        let dots: String = ".".repeat(KEY_WIDTH.saturating_sub(key.len()));
        print(&format!(
            " {} {}{}{} {value}",
            branch.bright_black(),
            key.color(colors::TEXT_DEFAULT),
            dots.color(colors::SEPARATOR),
            ":".color(colors::SEPARATOR),
        ));
    }
}

pub fn centerln(msg: &str) {
    let pad: String = " ".repeat(TOTAL_WIDTH.saturating_sub(console::measure_text_width(msg)) / 2);
    print(&format!("{pad}{msg}"));
}

pub fn no_results() {
    print(&NO_RESULTS.red().bold().to_string());
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

/// Structured console logging for ContestPay
///
/// Provides tagged, colored log output with per-module debug filtering.
/// DEBUG-level messages are only shown when the matching --debug-<module>
/// flag is present on the command line (see global::CMD_ARGS).

use chrono::Utc;
use colored::*;
use std::io::{ self, Write };

use crate::global::is_debug_enabled_for;

/// Log tags identifying the originating subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    System,
    Rpc,
    Payments,
    Ledger,
    Wallet,
}

impl LogTag {
    /// Short label used in console output and --debug-<label> flags
    pub fn label(&self) -> &'static str {
        match self {
            LogTag::System => "system",
            LogTag::Rpc => "rpc",
            LogTag::Payments => "payments",
            LogTag::Ledger => "ledger",
            LogTag::Wallet => "wallet",
        }
    }

    fn colored_label(&self) -> ColoredString {
        let label = format!("[{}]", self.label().to_uppercase());
        match self {
            LogTag::System => label.cyan(),
            LogTag::Rpc => label.magenta(),
            LogTag::Payments => label.blue(),
            LogTag::Ledger => label.green(),
            LogTag::Wallet => label.yellow(),
        }
    }
}

/// Central logging function
///
/// `level` is a short event label: the well-known levels ERROR / WARNING /
/// SUCCESS / DEBUG get level-specific coloring, anything else (e.g. "VERIFY",
/// "SETTLE") is treated as informational.
pub fn log(tag: LogTag, level: &str, message: &str) {
    // DEBUG output is opt-in per tag via --debug-<tag>
    if level == "DEBUG" && !is_debug_enabled_for(tag.label()) {
        return;
    }

    let timestamp = Utc::now().format("%H:%M:%S%.3f").to_string();

    let (icon, formatted_message) = match level {
        "ERROR" => ("❌".red().bold(), message.red().to_string()),
        "WARNING" => ("⚠".yellow().bold(), message.yellow().to_string()),
        "SUCCESS" => ("✅".green().bold(), message.green().to_string()),
        "DEBUG" => ("🐛".purple().bold(), message.dimmed().to_string()),
        _ => ("ℹ".blue().bold(), message.to_string()),
    };

    println!(
        "{} {} {} {} {}",
        icon,
        format!("[{}]", timestamp).dimmed(),
        tag.colored_label(),
        level.bold(),
        formatted_message
    );
    let _ = io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_labels() {
        assert_eq!(LogTag::Payments.label(), "payments");
        assert_eq!(LogTag::Ledger.label(), "ledger");
    }

    #[test]
    fn test_log_does_not_panic() {
        log(LogTag::System, "INFO", "logger smoke test");
        log(LogTag::Rpc, "DEBUG", "hidden without --debug-rpc");
    }
}

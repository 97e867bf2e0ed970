//! Console output utilities.

use console::style;

use crate::config::Config;

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", style("INFO").cyan().bold(), message);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", style("OK").green().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", style("WARN").yellow().bold(), message);
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", style("ERROR").red().bold(), message);
}

/// Print the application banner.
pub fn print_banner() {
    let banner = r#"
╔═══════════════════════════════════════════════════════╗
║     Weibo Harvester                                   ║
║     Posts, comments, media and profiles from Weibo    ║
╚═══════════════════════════════════════════════════════╝
"#;
    println!("{}", style(banner).cyan());
}

/// Print configuration summary.
pub fn print_config_summary(config: &Config) {
    let modes: Vec<&str> = config.enabled_modes().iter().map(|m| m.as_str()).collect();

    println!();
    println!("{}", style("Configuration:").bold());
    println!("  Modes: {}", modes.join(", "));
    println!("  Keywords: {}", config.active_keywords().join(", "));
    println!("  Post links: {}", config.active_post_urls().len());
    println!("  Users: {}", config.active_users().join(", "));
    println!("  Format: {}", config.output.save_format);
    println!("  Directory: {}", config.output.directory.display());
    println!();
}

//! Run summary reporting.

use console::style;

use crate::crawl::RunReport;

/// Print totals, output locations and recently touched entries.
pub fn print_run_summary(report: &RunReport) {
    let totals = &report.totals;

    println!();
    println!("{}", style("═".repeat(50)).dim());
    if report.interrupted {
        println!("{}", style("Run Summary (interrupted):").yellow().bold());
    } else {
        println!("{}", style("Run Summary:").bold());
    }
    println!("  Posts:    {}", style(totals.posts).green());
    println!("  Comments: {}", style(totals.comments).green());
    println!("  Media:    {}", style(totals.media).green());
    println!("  Profiles: {}", style(totals.profiles).green());

    println!();
    println!("{}", style("Output:").bold());
    for (label, path) in &report.outputs {
        println!("  {:<14} {}", label, path.display());
    }

    if !report.recent_posts.is_empty() {
        println!();
        println!("{}", style("Recent posts:").bold());
        for url in &report.recent_posts {
            println!("  {}", url);
        }
    }
    if !report.recent_users.is_empty() {
        println!("  Users: {}", report.recent_users.join(", "));
    }
    println!("{}", style("═".repeat(50)).dim());
}

//! Logpath command implementation.

use anyhow::Result;

use super::Context;

/// Run the logpath command
pub async fn run(ctx: &Context, logpath: &str) -> Result<()> {
    let (_, connector) = ctx.connect().await?;
    let tests = connector.test_logpath_with_resolution(logpath).await?;

    ctx.emit(&tests, |tests| {
        for test in tests {
            if test.pattern == test.resolved {
                println!("{}", test.pattern);
            } else {
                println!("{} -> {}", test.pattern, test.resolved);
            }
            if test.files.is_empty() {
                println!("  (no matching files)");
            }
            for file in &test.files {
                println!("  {}", file);
            }
        }
    })
}

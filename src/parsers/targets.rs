//! Line-oriented target list parser.
//!
//! Each non-blank, non-comment line is `<target> [options...]`. A line with
//! only a target inherits the default options; extra tokens replace them.

use crate::models::ScanTask;

/// Parse a target list into tasks, preserving line order.
pub fn parse_targets(content: &str, default_options: &str) -> Vec<ScanTask> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let target = tokens.next()?;
            let rest: Vec<&str> = tokens.collect();
            let options = if rest.is_empty() {
                default_options.to_string()
            } else {
                rest.join(" ")
            };
            Some(ScanTask::new(target, options))
        })
        .collect()
}

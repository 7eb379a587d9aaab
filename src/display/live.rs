use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::DisplaySink;

// Truncated to terminal width by `{wide_msg}`
const RULE: &str = "────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────────";

const HEADER_TEMPLATE: &str = "{prefix:.bold} {wide_msg:.dim}";
const ROW_TEMPLATE: &str = "{prefix:.dim} {wide_msg}";
const FOOTER_TEMPLATE: &str = "{wide_msg:.dim}";

/// Body rows for a panel of `capacity` rows.
///
/// Missing rows are blank and sit above the output, so new lines always
/// enter at the bottom of the panel.
pub fn frame_rows(snapshot: &[String], capacity: usize) -> Vec<String> {
    let shown = &snapshot[snapshot.len().saturating_sub(capacity)..];
    let padding = capacity - shown.len();

    std::iter::repeat(String::new())
        .take(padding)
        .chain(shown.iter().cloned())
        .collect()
}

/// Titled, fixed-height scrolling panel drawn with indicatif.
///
/// Each panel row is its own bar inside a [`MultiProgress`], so indicatif
/// handles cursor movement, width truncation and redraw rate limiting.
pub struct LiveView {
    header: ProgressBar,
    rows: Vec<ProgressBar>,
    footer: ProgressBar,
    capacity: usize,
}

impl LiveView {
    /// Panel drawn on stderr (hidden when stderr is not a terminal)
    pub fn new(title: &str, capacity: usize) -> Self {
        Self::with_draw_target(title, capacity, ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(title: &str, capacity: usize, target: ProgressDrawTarget) -> Self {
        let capacity = capacity.max(1);
        let multi = MultiProgress::with_draw_target(target);

        let header = multi.add(Self::bar(HEADER_TEMPLATE));
        header.set_prefix(format!("╭─ {}", title));
        header.set_message(RULE);

        let rows = (0..capacity)
            .map(|_| {
                let row = multi.add(Self::bar(ROW_TEMPLATE));
                row.set_prefix("│");
                row
            })
            .collect();

        let footer = multi.add(Self::bar(FOOTER_TEMPLATE));
        footer.set_message(format!("╰{}", RULE));

        let mut view = Self {
            header,
            rows,
            footer,
            capacity,
        };
        view.refresh(&[]);
        view
    }

    /// Messages currently shown in the body rows, top to bottom
    pub fn visible_rows(&self) -> Vec<String> {
        self.rows.iter().map(ProgressBar::message).collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn bar(template: &str) -> ProgressBar {
        let style = ProgressStyle::with_template(template).unwrap_or_else(|e| {
            tracing::warn!("Invalid panel template {:?}: {}", template, e);
            ProgressStyle::default_spinner()
        });
        ProgressBar::new_spinner().with_style(style)
    }
}

impl DisplaySink for LiveView {
    fn refresh(&mut self, snapshot: &[String]) {
        for (row, text) in self.rows.iter().zip(frame_rows(snapshot, self.capacity)) {
            row.set_message(text);
        }
    }

    fn finish(&mut self) {
        self.header.finish();
        for row in &self.rows {
            row.finish();
        }
        self.footer.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_frame_rows_pads_above_output() {
        assert_eq!(frame_rows(&lines(&["a"]), 3), lines(&["", "", "a"]));
        assert_eq!(frame_rows(&[], 2), lines(&["", ""]));
    }

    #[test]
    fn test_frame_rows_keeps_latest_when_oversized() {
        assert_eq!(
            frame_rows(&lines(&["a", "b", "c", "d"]), 2),
            lines(&["c", "d"])
        );
    }

    #[test]
    fn test_live_view_refresh_updates_rows() {
        let mut view = LiveView::with_draw_target("Build", 3, ProgressDrawTarget::hidden());
        assert_eq!(view.visible_rows(), lines(&["", "", ""]));

        view.refresh(&lines(&["compiling", "linking"]));
        assert_eq!(view.visible_rows(), lines(&["", "compiling", "linking"]));

        // Refreshing with the same snapshot is a no-op
        view.refresh(&lines(&["compiling", "linking"]));
        assert_eq!(view.visible_rows(), lines(&["", "compiling", "linking"]));

        view.finish();
        assert_eq!(view.capacity(), 3);
    }
}

//! Text measurement.
//!
//! Lane allocation is only sound when widths are accurate, so the engine asks
//! the host's text stack for them through [`TextMeasurer`] instead of
//! counting characters.

use tracing::debug;
use unicode_width::UnicodeWidthStr;

use crate::config::DanmakuStyle;

/// Measures rendered text width in pixels.
///
/// Returning `None` (or a non-finite or negative width) marks the text as
/// unmeasurable; the engine then lays it out with zero width.
pub trait TextMeasurer: Send {
    fn measure(&self, text: &str, style: &DanmakuStyle) -> Option<f64>;
}

impl<F> TextMeasurer for F
where
    F: Fn(&str, &DanmakuStyle) -> Option<f64> + Send,
{
    fn measure(&self, text: &str, style: &DanmakuStyle) -> Option<f64> {
        self(text, style)
    }
}

/// Measure `text`, absorbing failures as zero width.
pub(crate) fn measured_width(measurer: &dyn TextMeasurer, text: &str, style: &DanmakuStyle) -> f64 {
    match measurer.measure(text, style) {
        Some(width) if width.is_finite() && width >= 0.0 => width,
        other => {
            debug!(text_len = text.len(), width = ?other, "Unmeasurable danmaku text, using zero width");
            0.0
        }
    }
}

/// Terminal-style measurer: every East Asian wide character takes two cells,
/// everything else one. A cell is `cell_ratio * font_size` pixels wide.
///
/// Suitable for headless hosts and monospace renderers; proportional fonts
/// need a real shaper behind [`TextMeasurer`].
#[derive(Debug, Clone, Copy)]
pub struct CellWidthMeasurer {
    pub cell_ratio: f64,
}

impl Default for CellWidthMeasurer {
    fn default() -> Self {
        Self { cell_ratio: 0.5 }
    }
}

impl TextMeasurer for CellWidthMeasurer {
    fn measure(&self, text: &str, style: &DanmakuStyle) -> Option<f64> {
        if text.is_empty() {
            return None;
        }
        let cells = text.width() as f64;
        Some(cells * self.cell_ratio * style.font_size + 2.0 * style.stroke_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> DanmakuStyle {
        DanmakuStyle {
            font_size: 20.0,
            stroke_width: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_cell_width_handles_wide_characters() {
        let m = CellWidthMeasurer::default();
        assert_eq!(m.measure("abcd", &style()), Some(40.0));
        // Two wide characters take as much room as four narrow ones
        assert_eq!(m.measure("弾幕", &style()), Some(40.0));
        assert_eq!(m.measure("ab弾", &style()), Some(40.0));
    }

    #[test]
    fn test_cell_width_includes_stroke() {
        let m = CellWidthMeasurer::default();
        let stroked = DanmakuStyle {
            stroke_width: 3.0,
            ..style()
        };
        assert_eq!(m.measure("ab", &stroked), Some(26.0));
    }

    #[test]
    fn test_failures_become_zero_width() {
        let m = CellWidthMeasurer::default();
        assert_eq!(measured_width(&m, "", &style()), 0.0);

        let broken = |_: &str, _: &DanmakuStyle| Some(f64::NAN);
        assert_eq!(measured_width(&broken, "text", &style()), 0.0);

        let negative = |_: &str, _: &DanmakuStyle| Some(-5.0);
        assert_eq!(measured_width(&negative, "text", &style()), 0.0);
    }

    #[test]
    fn test_closure_measurer() {
        let fixed = |text: &str, _: &DanmakuStyle| Some(text.len() as f64 * 10.0);
        assert_eq!(measured_width(&fixed, "abc", &style()), 30.0);
    }
}

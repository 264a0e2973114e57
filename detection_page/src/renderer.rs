use crate::container::ImageContainer;
use crate::detection::DetectionResult;

/// One box drawn over the displayed image. Positions are percentages of the
/// image size.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayBox {
    pub label: String,
    pub color: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl OverlayBox {
    pub fn from_detection(result: &DetectionResult, color: String) -> Self {
        let bbox = &result.bbox;
        Self {
            label: result.label.clone(),
            color,
            left: 100.0 * bbox.xmin,
            top: 100.0 * bbox.ymin,
            width: 100.0 * (bbox.xmax - bbox.xmin),
            height: 100.0 * (bbox.ymax - bbox.ymin),
        }
    }

    pub fn box_style(&self) -> String {
        format!(
            "border-color: {}; left: {}; top: {}; width: {}; height: {};",
            self.color,
            format_percent(self.left),
            format_percent(self.top),
            format_percent(self.width),
            format_percent(self.height)
        )
    }

    pub fn label_style(&self) -> String {
        format!("background-color: {};", self.color)
    }
}

pub struct Renderer;

impl Renderer {
    /// Appends an overlay for `result` to the container, outlined in a fresh
    /// random color.
    pub fn render_box<'a>(
        container: &'a mut ImageContainer,
        result: &DetectionResult,
    ) -> &'a OverlayBox {
        let overlay = OverlayBox::from_detection(result, random_color());
        tracing::debug!(
            "Rendering `{}` at {}",
            overlay.label,
            overlay.box_style()
        );
        container.append(overlay)
    }
}

pub fn random_color() -> String {
    format!("#{:06x}", rand::random_range(0..0xffffff_u32))
}

/// Formats a percentage with at most four decimals, e.g. `10%`, `33.3333%`.
pub fn format_percent(value: f64) -> String {
    let fixed = format!("{:.4}", value);
    let trimmed = if fixed.contains('.') {
        fixed.trim_end_matches('0').trim_end_matches('.')
    } else {
        fixed.as_str()
    };
    if trimmed == "-0" {
        return "0%".to_string();
    }
    format!("{}%", trimmed)
}

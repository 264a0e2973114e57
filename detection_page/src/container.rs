use crate::renderer::OverlayBox;

/// The displayed image and the boxes drawn over it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageContainer {
    image_src: Option<String>,
    overlays: Vec<OverlayBox>,
}

impl ImageContainer {
    pub fn clear(&mut self) {
        self.image_src = None;
        self.overlays.clear();
    }

    /// Replaces whatever was shown with a new image and no overlays.
    pub fn display_image(&mut self, src: String) {
        self.clear();
        self.image_src = Some(src);
    }

    pub fn append(&mut self, overlay: OverlayBox) -> &OverlayBox {
        self.overlays.push(overlay);
        &self.overlays[self.overlays.len() - 1]
    }

    pub fn image_src(&self) -> Option<&str> {
        self.image_src.as_deref()
    }

    pub fn overlays(&self) -> &[OverlayBox] {
        &self.overlays
    }

    pub fn is_empty(&self) -> bool {
        self.image_src.is_none() && self.overlays.is_empty()
    }
}

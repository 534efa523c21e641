//! Optional device features, detected once at startup.

use crate::config::ViewerConfig;

/// Height of the category bar at the bottom of the screen.
pub const CATEGORY_BAR_HEIGHT: i32 = 44;

/// Extra band above the category bar in which drags are ignored.
pub const TOUCH_MARGIN: i32 = 10;

/// A platform feature that is either present, with its handle, or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability<T> {
    Supported(T),
    Unsupported,
}

impl<T> Capability<T> {
    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Supported(_))
    }

    pub fn as_ref(&self) -> Capability<&T> {
        match self {
            Capability::Supported(t) => Capability::Supported(t),
            Capability::Unsupported => Capability::Unsupported,
        }
    }

    pub fn as_mut(&mut self) -> Capability<&mut T> {
        match self {
            Capability::Supported(t) => Capability::Supported(t),
            Capability::Unsupported => Capability::Unsupported,
        }
    }

    pub fn supported(self) -> Option<T> {
        match self {
            Capability::Supported(t) => Some(t),
            Capability::Unsupported => None,
        }
    }
}

/// Hardware back key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackKey;

/// Bottom tab bar switching between the Featured and Search views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryBar {
    visible: bool,
}

impl CategoryBar {
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Whether a tap at `y` lands on the bar of a `view_height` tall view.
    pub fn covers_tap(&self, y: i32, view_height: i32) -> bool {
        self.visible && y > view_height - CATEGORY_BAR_HEIGHT
    }

    /// Whether a drag currently at `y` is on (or just above) the bar.
    pub fn covers_drag(&self, y: i32, view_height: i32) -> bool {
        self.visible && y > view_height - CATEGORY_BAR_HEIGHT - TOUCH_MARGIN
    }
}

/// Every optional feature of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub back_key: Capability<BackKey>,
    pub category_bar: Capability<CategoryBar>,
}

impl Capabilities {
    pub fn detect(config: &ViewerConfig) -> Self {
        let back_key = if config.one_key_back {
            Capability::Supported(BackKey)
        } else {
            Capability::Unsupported
        };
        let category_bar = if config.category_bar {
            Capability::Supported(CategoryBar { visible: true })
        } else {
            Capability::Unsupported
        };
        log::info!(
            "capabilities: back key {}, category bar {}",
            back_key.is_supported(),
            category_bar.is_supported()
        );
        Self {
            back_key,
            category_bar,
        }
    }

    pub fn has_back_key(&self) -> bool {
        self.back_key.is_supported()
    }

    pub fn set_category_bar_visible(&mut self, visible: bool) {
        if let Capability::Supported(bar) = self.category_bar.as_mut() {
            bar.set_visible(visible);
        }
    }

    pub fn category_bar_visible(&self) -> bool {
        matches!(self.category_bar, Capability::Supported(bar) if bar.is_visible())
    }

    pub fn tap_on_category_bar(&self, y: i32, view_height: i32) -> bool {
        self.category_bar
            .as_ref()
            .supported()
            .is_some_and(|bar| bar.covers_tap(y, view_height))
    }

    pub fn drag_on_category_bar(&self, y: i32, view_height: i32) -> bool {
        self.category_bar
            .as_ref()
            .supported()
            .is_some_and(|bar| bar.covers_drag(y, view_height))
    }
}

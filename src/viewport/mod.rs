//! Pan/zoom state for the diagram views
//!
//! A [`Viewport`] maps diagram content coordinates onto viewer coordinates
//! through an affine [`Transform`] (`viewer = scale * content + translate`).
//! Content updates never touch it; only explicit [`ViewportAction`]s and
//! container resizes do.

use crate::config::ViewportSection;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub mod controller;

pub use controller::ViewportController;

/// The two diagram views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagram {
    /// Control-flow graph from `cfg`
    Graph,
    /// Coverage chart from `coverage_over_time`
    Coverage,
}

impl Diagram {
    pub const ALL: [Diagram; 2] = [Diagram::Graph, Diagram::Coverage];
}

impl fmt::Display for Diagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagram::Graph => f.write_str("graph"),
            Diagram::Coverage => f.write_str("coverage"),
        }
    }
}

/// Interaction tool active on a viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    None,
    Pan,
    ZoomIn,
    ZoomOut,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn center(self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    fn is_positive(self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Axis-aligned rectangle in content coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn center(self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Content-to-viewer affine transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub scale: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translate_x: 0.0,
            translate_y: 0.0,
        }
    }
}

impl Transform {
    /// Viewer position of a content point
    pub fn apply(&self, content: Point) -> Point {
        Point::new(
            self.scale * content.x + self.translate_x,
            self.scale * content.y + self.translate_y,
        )
    }

    /// Content position under a viewer point
    pub fn invert(&self, viewer: Point) -> Point {
        Point::new(
            (viewer.x - self.translate_x) / self.scale,
            (viewer.y - self.translate_y) / self.scale,
        )
    }
}

/// Zoom clamps and wheel sensitivity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportLimits {
    pub zoom_min: f64,
    pub zoom_max: f64,
    pub wheel_scale_factor: f64,
}

impl Default for ViewportLimits {
    fn default() -> Self {
        Self {
            zoom_min: 0.02,
            zoom_max: 50.0,
            wheel_scale_factor: 2.0,
        }
    }
}

impl ViewportLimits {
    fn clamp(&self, scale: f64) -> f64 {
        scale.clamp(self.zoom_min, self.zoom_max)
    }
}

/// Explicit user interactions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ViewportAction {
    Pan { dx: f64, dy: f64 },
    Zoom { factor: f64, at: Point },
    ZoomOnViewerCenter { factor: f64 },
    /// Wheel notch; negative delta zooms in
    Wheel { delta: f64, at: Point },
    /// Pointer click, interpreted by the active tool
    Click { at: Point },
    SetTool { tool: Tool },
    Reset,
    FitToContent,
    FitSelection { rect: Rect },
}

/// Pan/zoom state of one diagram view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Viewport {
    pub transform: Transform,
    pub tool: Tool,
    pub viewer: Size,
    pub content: Size,
    pub limits: ViewportLimits,
}

impl Viewport {
    pub fn new(viewer: Size, content: Size, tool: Tool, limits: ViewportLimits) -> Self {
        Self {
            transform: Self::home(&limits),
            tool,
            viewer,
            content,
            limits,
        }
    }

    /// Untranslated transform at the nearest allowed scale to 1
    fn home(limits: &ViewportLimits) -> Transform {
        Transform {
            scale: limits.clamp(1.0),
            ..Transform::default()
        }
    }

    pub fn from_config(section: &ViewportSection) -> Self {
        Self::new(
            Size::new(section.viewer_width, section.viewer_height),
            Size::new(section.content_width, section.content_height),
            section.default_tool,
            ViewportLimits {
                zoom_min: section.zoom_min,
                zoom_max: section.zoom_max,
                wheel_scale_factor: section.wheel_scale_factor,
            },
        )
    }

    /// Apply a user action. Returns whether anything changed.
    pub fn apply(&mut self, action: ViewportAction) -> bool {
        let before = self.clone();

        match action {
            ViewportAction::Pan { dx, dy } => self.pan(dx, dy),
            ViewportAction::Zoom { factor, at } => self.zoom(factor, at),
            ViewportAction::ZoomOnViewerCenter { factor } => {
                self.zoom(factor, self.viewer.center())
            }
            ViewportAction::Wheel { delta, at } => self.wheel(delta, at),
            ViewportAction::Click { at } => self.click(at),
            ViewportAction::SetTool { tool } => self.tool = tool,
            ViewportAction::Reset => self.transform = Self::home(&self.limits),
            ViewportAction::FitToContent => {
                let content = Rect::new(0.0, 0.0, self.content.width, self.content.height);
                self.fit_selection(content);
            }
            ViewportAction::FitSelection { rect } => self.fit_selection(rect),
        }

        *self != before
    }

    /// Container resize: keeps the scale and the content point under the
    /// viewer centre
    pub fn resize(&mut self, width: f64, height: f64) -> bool {
        let size = Size::new(width, height);
        if !size.is_positive() {
            debug!(width, height, "Ignoring degenerate viewer size");
            return false;
        }
        if size == self.viewer {
            return false;
        }

        let old_center = self.viewer.center();
        let new_center = size.center();
        self.transform.translate_x += new_center.x - old_center.x;
        self.transform.translate_y += new_center.y - old_center.y;
        self.viewer = size;
        true
    }

    fn pan(&mut self, dx: f64, dy: f64) {
        if dx.is_finite() && dy.is_finite() {
            self.transform.translate_x += dx;
            self.transform.translate_y += dy;
        }
    }

    /// Scale by `factor` keeping the content under `at` fixed
    fn zoom(&mut self, factor: f64, at: Point) {
        if !(factor.is_finite() && factor > 0.0) {
            debug!(factor, "Ignoring invalid zoom factor");
            return;
        }

        let anchor = self.transform.invert(at);
        let scale = self.limits.clamp(self.transform.scale * factor);
        self.transform = Transform {
            scale,
            translate_x: at.x - scale * anchor.x,
            translate_y: at.y - scale * anchor.y,
        };
    }

    fn wheel(&mut self, delta: f64, at: Point) {
        if delta == 0.0 || !delta.is_finite() {
            return;
        }
        let notch = delta.clamp(-1.0, 1.0);
        self.zoom(self.limits.wheel_scale_factor.powf(-notch), at);
    }

    fn click(&mut self, at: Point) {
        let factor = self.limits.wheel_scale_factor;
        match self.tool {
            Tool::ZoomIn => self.zoom(factor, at),
            Tool::ZoomOut => self.zoom(1.0 / factor, at),
            Tool::None | Tool::Pan | Tool::Auto => {}
        }
    }

    fn fit_selection(&mut self, rect: Rect) {
        if !(rect.width > 0.0 && rect.height > 0.0) {
            debug!(?rect, "Ignoring degenerate selection");
            return;
        }

        let scale = self
            .limits
            .clamp((self.viewer.width / rect.width).min(self.viewer.height / rect.height));
        let focus = rect.center();
        let center = self.viewer.center();
        self.transform = Transform {
            scale,
            translate_x: center.x - scale * focus.x,
            translate_y: center.y - scale * focus.y,
        };
    }
}

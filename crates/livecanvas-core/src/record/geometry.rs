//! Per-kind geometry of a shape record.

use super::ShapeKind;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Font family options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FontFamily {
    #[default]
    Helvetica,
    TimesNewRoman,
    ComicSans,
    BrushScript,
}

/// Font weight options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FontWeight {
    #[default]
    Normal,
    Semibold,
    Bold,
}

impl FontWeight {
    /// CSS numeric weight.
    pub fn css_weight(&self) -> u16 {
        match self {
            FontWeight::Normal => 400,
            FontWeight::Semibold => 600,
            FontWeight::Bold => 800,
        }
    }

    pub fn from_css_weight(weight: u16) -> Option<Self> {
        match weight {
            400 => Some(FontWeight::Normal),
            600 => Some(FontWeight::Semibold),
            800 => Some(FontWeight::Bold),
            _ => None,
        }
    }
}

/// Font attributes of a text shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFont {
    pub size: f64,
    pub family: FontFamily,
    pub weight: FontWeight,
}

impl TextFont {
    pub const DEFAULT_SIZE: f64 = 36.0;
    pub const MIN_SIZE: f64 = 1.0;
    pub const MAX_SIZE: f64 = 512.0;
}

impl Default for TextFont {
    fn default() -> Self {
        Self {
            size: Self::DEFAULT_SIZE,
            family: FontFamily::default(),
            weight: FontWeight::default(),
        }
    }
}

/// Geometry of a shape. The variant determines the record's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeGeometry {
    Rectangle {
        position: Point,
        width: f64,
        height: f64,
        rotation: f64,
    },
    Ellipse {
        center: Point,
        radius_x: f64,
        radius_y: f64,
        rotation: f64,
    },
    /// Isosceles triangle inscribed in its bounding box.
    Triangle {
        position: Point,
        width: f64,
        height: f64,
        rotation: f64,
    },
    Line {
        start: Point,
        end: Point,
    },
    Path {
        points: Vec<Point>,
    },
    Text {
        position: Point,
        content: String,
        font: TextFont,
    },
    Image {
        position: Point,
        width: f64,
        height: f64,
        /// Image data (data URL or base64 payload).
        source: String,
    },
}

impl ShapeGeometry {
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeGeometry::Rectangle { .. } => ShapeKind::Rectangle,
            ShapeGeometry::Ellipse { .. } => ShapeKind::Ellipse,
            ShapeGeometry::Triangle { .. } => ShapeKind::Triangle,
            ShapeGeometry::Line { .. } => ShapeKind::Line,
            ShapeGeometry::Path { .. } => ShapeKind::Path,
            ShapeGeometry::Text { .. } => ShapeKind::Text,
            ShapeGeometry::Image { .. } => ShapeKind::Image,
        }
    }

    /// Bounding box in world coordinates, ignoring rotation.
    pub fn bounds(&self) -> Rect {
        match self {
            ShapeGeometry::Rectangle { position, width, height, .. }
            | ShapeGeometry::Triangle { position, width, height, .. }
            | ShapeGeometry::Image { position, width, height, .. } => {
                Rect::new(position.x, position.y, position.x + width, position.y + height)
            }
            ShapeGeometry::Ellipse { center, radius_x, radius_y, .. } => Rect::new(
                center.x - radius_x,
                center.y - radius_y,
                center.x + radius_x,
                center.y + radius_y,
            ),
            ShapeGeometry::Line { start, end } => Rect::from_points(*start, *end),
            ShapeGeometry::Path { points } => {
                let Some(first) = points.first() else {
                    return Rect::ZERO;
                };
                points
                    .iter()
                    .fold(Rect::from_points(*first, *first), |acc, p| acc.union_pt(*p))
            }
            ShapeGeometry::Text { position, content, font } => {
                // Rough estimate until the surface reports measured text.
                let width = content.chars().count() as f64 * font.size * 0.6;
                Rect::new(position.x, position.y, position.x + width, position.y + font.size)
            }
        }
    }
}

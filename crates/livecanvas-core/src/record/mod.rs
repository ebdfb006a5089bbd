//! Shared shape records.
//!
//! A [`ShapeRecord`] is the full, self-contained description of one drawing
//! primitive as it lives in the shared object store. Every write carries the
//! whole record; the store never merges individual fields.

mod attributes;
mod geometry;

pub use attributes::{AttributeUpdate, ElementAttributes};
pub use geometry::{FontFamily, FontWeight, ShapeGeometry, TextFont};

use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of a shared object. Assigned once, never reused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier for a newly drawn shape.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Variant tag of a shape record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Triangle,
    Line,
    Path,
    Text,
    Image,
}

impl ShapeKind {
    /// Tag used in the CRDT encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Ellipse => "ellipse",
            ShapeKind::Triangle => "triangle",
            ShapeKind::Line => "line",
            ShapeKind::Path => "path",
            ShapeKind::Text => "text",
            ShapeKind::Image => "image",
        }
    }

    /// Parse a tag produced by [`ShapeKind::as_str`].
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "rectangle" => Some(ShapeKind::Rectangle),
            "ellipse" => Some(ShapeKind::Ellipse),
            "triangle" => Some(ShapeKind::Triangle),
            "line" => Some(ShapeKind::Line),
            "path" => Some(ShapeKind::Path),
            "text" => Some(ShapeKind::Text),
            "image" => Some(ShapeKind::Image),
            _ => None,
        }
    }
}

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    /// Parse `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        match digits.len() {
            6 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, 255)),
            8 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    /// Format as `#rrggbb`, appending alpha only when not opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

/// Style properties shared by every shape kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    /// Stroke color.
    pub stroke_color: SerializableColor,
    /// Stroke width.
    pub stroke_width: f64,
    /// Fill color (None = no fill).
    pub fill_color: Option<SerializableColor>,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        let accent = SerializableColor::new(0xaa, 0xbb, 0xcc, 255);
        Self {
            stroke_color: accent,
            stroke_width: 1.0,
            fill_color: Some(accent),
        }
    }
}

/// One shared drawing primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub object_id: ObjectId,
    pub geometry: ShapeGeometry,
    pub style: ShapeStyle,
}

impl ShapeRecord {
    /// Create a record with the default style.
    pub fn new(object_id: ObjectId, geometry: ShapeGeometry) -> Self {
        Self {
            object_id,
            geometry,
            style: ShapeStyle::default(),
        }
    }

    /// Axis-aligned rectangle at `position`.
    pub fn rectangle(object_id: impl Into<ObjectId>, position: Point, width: f64, height: f64) -> Self {
        Self::new(
            object_id.into(),
            ShapeGeometry::Rectangle {
                position,
                width,
                height,
                rotation: 0.0,
            },
        )
    }

    /// Freehand path through `points`, stroked but not filled.
    pub fn path(object_id: impl Into<ObjectId>, points: Vec<Point>) -> Self {
        let mut record = Self::new(object_id.into(), ShapeGeometry::Path { points });
        record.style.fill_color = None;
        record
    }

    pub fn kind(&self) -> ShapeKind {
        self.geometry.kind()
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

//! Attribute editing commands for the design panel.

use super::{FontFamily, FontWeight, SerializableColor, ShapeGeometry, ShapeKind, ShapeRecord, TextFont};
use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// A single attribute edit, validated against the target shape's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "attribute", content = "value", rename_all = "snake_case")]
pub enum AttributeUpdate {
    SetWidth(f64),
    SetHeight(f64),
    SetFill(SerializableColor),
    SetStroke(SerializableColor),
    SetFontSize(f64),
    SetFontFamily(FontFamily),
    SetFontWeight(FontWeight),
}

impl AttributeUpdate {
    pub fn name(&self) -> &'static str {
        match self {
            AttributeUpdate::SetWidth(_) => "width",
            AttributeUpdate::SetHeight(_) => "height",
            AttributeUpdate::SetFill(_) => "fill",
            AttributeUpdate::SetStroke(_) => "stroke",
            AttributeUpdate::SetFontSize(_) => "font_size",
            AttributeUpdate::SetFontFamily(_) => "font_family",
            AttributeUpdate::SetFontWeight(_) => "font_weight",
        }
    }

    /// Whether this attribute can be applied to shapes of `kind`.
    pub fn applies_to(&self, kind: ShapeKind) -> bool {
        match self {
            AttributeUpdate::SetWidth(_) | AttributeUpdate::SetHeight(_) => matches!(
                kind,
                ShapeKind::Rectangle | ShapeKind::Ellipse | ShapeKind::Triangle | ShapeKind::Image
            ),
            AttributeUpdate::SetFill(_) => kind != ShapeKind::Line,
            AttributeUpdate::SetStroke(_) => true,
            AttributeUpdate::SetFontSize(_)
            | AttributeUpdate::SetFontFamily(_)
            | AttributeUpdate::SetFontWeight(_) => kind == ShapeKind::Text,
        }
    }

    /// Apply the edit to `record` in place.
    ///
    /// The record is left untouched when the attribute does not fit its kind or
    /// the value is out of range.
    pub fn apply(&self, record: &mut ShapeRecord) -> SyncResult<()> {
        let kind = record.kind();
        if !self.applies_to(kind) {
            return Err(SyncError::AttributeMismatch {
                attribute: self.name(),
                kind,
            });
        }

        match self {
            AttributeUpdate::SetWidth(value) => {
                let value = positive(*value, "width")?;
                match &mut record.geometry {
                    ShapeGeometry::Rectangle { width, .. }
                    | ShapeGeometry::Triangle { width, .. }
                    | ShapeGeometry::Image { width, .. } => *width = value,
                    ShapeGeometry::Ellipse { radius_x, .. } => *radius_x = value / 2.0,
                    _ => {}
                }
            }
            AttributeUpdate::SetHeight(value) => {
                let value = positive(*value, "height")?;
                match &mut record.geometry {
                    ShapeGeometry::Rectangle { height, .. }
                    | ShapeGeometry::Triangle { height, .. }
                    | ShapeGeometry::Image { height, .. } => *height = value,
                    ShapeGeometry::Ellipse { radius_y, .. } => *radius_y = value / 2.0,
                    _ => {}
                }
            }
            AttributeUpdate::SetFill(color) => record.style.fill_color = Some(*color),
            AttributeUpdate::SetStroke(color) => record.style.stroke_color = *color,
            AttributeUpdate::SetFontSize(size) => {
                if !(TextFont::MIN_SIZE..=TextFont::MAX_SIZE).contains(size) {
                    return Err(SyncError::InvalidAttribute(format!("font size {size}")));
                }
                if let ShapeGeometry::Text { font, .. } = &mut record.geometry {
                    font.size = *size;
                }
            }
            AttributeUpdate::SetFontFamily(family) => {
                if let ShapeGeometry::Text { font, .. } = &mut record.geometry {
                    font.family = *family;
                }
            }
            AttributeUpdate::SetFontWeight(weight) => {
                if let ShapeGeometry::Text { font, .. } = &mut record.geometry {
                    font.weight = *weight;
                }
            }
        }
        Ok(())
    }
}

fn positive(value: f64, what: &str) -> SyncResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SyncError::InvalidAttribute(format!("{what} {value}")))
    }
}

/// Attribute read-out of the current selection, as shown in the design panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementAttributes {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub font_size: Option<f64>,
    pub font_family: Option<FontFamily>,
    pub font_weight: Option<FontWeight>,
    pub fill: Option<String>,
    pub stroke: String,
}

impl ElementAttributes {
    pub fn from_record(record: &ShapeRecord) -> Self {
        let bounds = record.geometry.bounds();
        let sized = AttributeUpdate::SetWidth(1.0).applies_to(record.kind());
        let font = match &record.geometry {
            ShapeGeometry::Text { font, .. } => Some(font),
            _ => None,
        };
        Self {
            width: sized.then(|| bounds.width()),
            height: sized.then(|| bounds.height()),
            font_size: font.map(|f| f.size),
            font_family: font.map(|f| f.family),
            font_weight: font.map(|f| f.weight),
            fill: record.style.fill_color.map(|c| c.to_hex()),
            stroke: record.style.stroke_color.to_hex(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    fn text_record() -> ShapeRecord {
        ShapeRecord::new(
            "t1".into(),
            ShapeGeometry::Text {
                position: Point::new(0.0, 0.0),
                content: "hello".to_string(),
                font: TextFont::default(),
            },
        )
    }

    #[test]
    fn test_width_on_rectangle() {
        let mut record = ShapeRecord::rectangle("r1", Point::new(0.0, 0.0), 10.0, 10.0);
        AttributeUpdate::SetWidth(42.0).apply(&mut record).unwrap();
        assert_eq!(record.geometry.bounds().width(), 42.0);
    }

    #[test]
    fn test_width_on_ellipse_sets_radius() {
        let mut record = ShapeRecord::new(
            "e1".into(),
            ShapeGeometry::Ellipse {
                center: Point::new(0.0, 0.0),
                radius_x: 5.0,
                radius_y: 5.0,
                rotation: 0.0,
            },
        );
        AttributeUpdate::SetHeight(30.0).apply(&mut record).unwrap();
        match record.geometry {
            ShapeGeometry::Ellipse { radius_y, .. } => assert_eq!(radius_y, 15.0),
            _ => panic!("geometry changed kind"),
        }
    }

    #[test]
    fn test_font_on_rectangle_is_rejected() {
        let mut record = ShapeRecord::rectangle("r1", Point::new(0.0, 0.0), 10.0, 10.0);
        let before = record.clone();
        let err = AttributeUpdate::SetFontSize(12.0).apply(&mut record).unwrap_err();
        assert!(matches!(err, SyncError::AttributeMismatch { kind: ShapeKind::Rectangle, .. }));
        assert_eq!(record, before);
    }

    #[test]
    fn test_fill_on_line_is_rejected() {
        let mut record = ShapeRecord::new(
            "l1".into(),
            ShapeGeometry::Line {
                start: Point::new(0.0, 0.0),
                end: Point::new(1.0, 1.0),
            },
        );
        let fill = SerializableColor::black();
        assert!(AttributeUpdate::SetFill(fill).apply(&mut record).is_err());
        assert!(AttributeUpdate::SetStroke(fill).apply(&mut record).is_ok());
    }

    #[test]
    fn test_text_font_updates() {
        let mut record = text_record();
        AttributeUpdate::SetFontSize(24.0).apply(&mut record).unwrap();
        AttributeUpdate::SetFontFamily(FontFamily::TimesNewRoman).apply(&mut record).unwrap();
        AttributeUpdate::SetFontWeight(FontWeight::Bold).apply(&mut record).unwrap();

        let attributes = ElementAttributes::from_record(&record);
        assert_eq!(attributes.font_size, Some(24.0));
        assert_eq!(attributes.font_family, Some(FontFamily::TimesNewRoman));
        assert_eq!(attributes.font_weight, Some(FontWeight::Bold));
        assert_eq!(attributes.width, None);
    }

    #[test]
    fn test_out_of_range_values() {
        let mut record = text_record();
        assert!(AttributeUpdate::SetFontSize(0.0).apply(&mut record).is_err());

        let mut rect = ShapeRecord::rectangle("r1", Point::new(0.0, 0.0), 10.0, 10.0);
        assert!(AttributeUpdate::SetWidth(-1.0).apply(&mut rect).is_err());
        assert!(AttributeUpdate::SetHeight(f64::NAN).apply(&mut rect).is_err());
    }

    #[test]
    fn test_attributes_readout() {
        let record = ShapeRecord::rectangle("r1", Point::new(5.0, 5.0), 20.0, 10.0);
        let attributes = ElementAttributes::from_record(&record);
        assert_eq!(attributes.width, Some(20.0));
        assert_eq!(attributes.height, Some(10.0));
        assert_eq!(attributes.fill.as_deref(), Some("#aabbcc"));
        assert_eq!(attributes.stroke, "#aabbcc");
    }
}

//! Conversion between shape records and Loro values.

use crate::error::{SyncError, SyncResult};
use crate::record::{
    FontFamily, FontWeight, ObjectId, SerializableColor, ShapeGeometry, ShapeKind, ShapeRecord,
    ShapeStyle, TextFont,
};
use kurbo::Point;
use loro::{LoroList, LoroMap, LoroMapValue, LoroResult, LoroValue};

// Common keys
const KEY_TYPE: &str = "type";
const KEY_ID: &str = "id";

// Style keys
const KEY_STROKE_R: &str = "stroke_r";
const KEY_STROKE_G: &str = "stroke_g";
const KEY_STROKE_B: &str = "stroke_b";
const KEY_STROKE_A: &str = "stroke_a";
const KEY_STROKE_WIDTH: &str = "stroke_width";
const KEY_FILL_R: &str = "fill_r";
const KEY_FILL_G: &str = "fill_g";
const KEY_FILL_B: &str = "fill_b";
const KEY_FILL_A: &str = "fill_a";
const KEY_HAS_FILL: &str = "has_fill";

// Box keys (rectangle, triangle, image, text anchor, ellipse center)
const KEY_X: &str = "x";
const KEY_Y: &str = "y";
const KEY_WIDTH: &str = "width";
const KEY_HEIGHT: &str = "height";
const KEY_ROTATION: &str = "rotation";

// Line keys
const KEY_START_X: &str = "start_x";
const KEY_START_Y: &str = "start_y";
const KEY_END_X: &str = "end_x";
const KEY_END_Y: &str = "end_y";

// Path keys
const KEY_POINTS: &str = "points";

// Text keys
const KEY_CONTENT: &str = "content";
const KEY_FONT_SIZE: &str = "font_size";
const KEY_FONT_FAMILY: &str = "font_family";
const KEY_FONT_WEIGHT: &str = "font_weight";

// Image keys
const KEY_SOURCE: &str = "source";

// Helper functions to extract values from LoroMapValue (derefs to HashMap<String, LoroValue>)
fn get_double(map: &LoroMapValue, key: &str) -> Option<f64> {
    match map.get(key)? {
        LoroValue::Double(d) => Some(*d),
        LoroValue::I64(i) => Some(*i as f64),
        _ => None,
    }
}

fn get_i64(map: &LoroMapValue, key: &str) -> Option<i64> {
    match map.get(key)? {
        LoroValue::I64(i) => Some(*i),
        LoroValue::Double(d) => Some(*d as i64),
        _ => None,
    }
}

fn get_string(map: &LoroMapValue, key: &str) -> Option<String> {
    match map.get(key)? {
        LoroValue::String(s) => Some(s.to_string()),
        _ => None,
    }
}

fn get_bool(map: &LoroMapValue, key: &str) -> Option<bool> {
    match map.get(key)? {
        LoroValue::Bool(b) => Some(*b),
        _ => None,
    }
}

/// Reads required fields of one encoded record, remembering which object is
/// being decoded so a missing field can be reported precisely.
struct FieldReader<'a> {
    id: &'a ObjectId,
    map: &'a LoroMapValue,
}

impl FieldReader<'_> {
    fn missing(&self, key: &str) -> SyncError {
        SyncError::MalformedRecord {
            object_id: self.id.clone(),
            reason: format!("missing or mistyped field `{key}`"),
        }
    }

    fn double(&self, key: &str) -> SyncResult<f64> {
        get_double(self.map, key).ok_or_else(|| self.missing(key))
    }

    fn channel(&self, key: &str) -> SyncResult<u8> {
        let value = get_i64(self.map, key).ok_or_else(|| self.missing(key))?;
        u8::try_from(value).map_err(|_| self.missing(key))
    }

    fn string(&self, key: &str) -> SyncResult<String> {
        get_string(self.map, key).ok_or_else(|| self.missing(key))
    }

    fn point(&self, x_key: &str, y_key: &str) -> SyncResult<Point> {
        Ok(Point::new(self.double(x_key)?, self.double(y_key)?))
    }
}

/// Convert a record to Loro map entries.
pub fn record_to_loro(record: &ShapeRecord, map: &LoroMap) -> LoroResult<()> {
    map.insert(KEY_TYPE, record.kind().as_str())?;
    map.insert(KEY_ID, record.object_id.to_string())?;

    match &record.geometry {
        ShapeGeometry::Rectangle { position, width, height, rotation }
        | ShapeGeometry::Triangle { position, width, height, rotation } => {
            map.insert(KEY_X, position.x)?;
            map.insert(KEY_Y, position.y)?;
            map.insert(KEY_WIDTH, *width)?;
            map.insert(KEY_HEIGHT, *height)?;
            map.insert(KEY_ROTATION, *rotation)?;
        }
        ShapeGeometry::Ellipse { center, radius_x, radius_y, rotation } => {
            map.insert(KEY_X, center.x)?;
            map.insert(KEY_Y, center.y)?;
            map.insert(KEY_WIDTH, *radius_x)?;
            map.insert(KEY_HEIGHT, *radius_y)?;
            map.insert(KEY_ROTATION, *rotation)?;
        }
        ShapeGeometry::Line { start, end } => {
            map.insert(KEY_START_X, start.x)?;
            map.insert(KEY_START_Y, start.y)?;
            map.insert(KEY_END_X, end.x)?;
            map.insert(KEY_END_Y, end.y)?;
        }
        ShapeGeometry::Path { points } => {
            // Store points as a list of [x, y] pairs
            let points_list = map.insert_container(KEY_POINTS, LoroList::new())?;
            for point in points {
                let point_list = points_list.insert_container(points_list.len(), LoroList::new())?;
                point_list.push(point.x)?;
                point_list.push(point.y)?;
            }
        }
        ShapeGeometry::Text { position, content, font } => {
            map.insert(KEY_X, position.x)?;
            map.insert(KEY_Y, position.y)?;
            map.insert(KEY_CONTENT, content.clone())?;
            map.insert(KEY_FONT_SIZE, font.size)?;
            map.insert(KEY_FONT_FAMILY, font_family_to_i64(font.family))?;
            map.insert(KEY_FONT_WEIGHT, font_weight_to_i64(font.weight))?;
        }
        ShapeGeometry::Image { position, width, height, source } => {
            map.insert(KEY_X, position.x)?;
            map.insert(KEY_Y, position.y)?;
            map.insert(KEY_WIDTH, *width)?;
            map.insert(KEY_HEIGHT, *height)?;
            map.insert(KEY_SOURCE, source.clone())?;
        }
    }

    style_to_loro(&record.style, map)
}

/// Convert style properties to Loro map entries.
fn style_to_loro(style: &ShapeStyle, map: &LoroMap) -> LoroResult<()> {
    map.insert(KEY_STROKE_R, style.stroke_color.r as i64)?;
    map.insert(KEY_STROKE_G, style.stroke_color.g as i64)?;
    map.insert(KEY_STROKE_B, style.stroke_color.b as i64)?;
    map.insert(KEY_STROKE_A, style.stroke_color.a as i64)?;
    map.insert(KEY_STROKE_WIDTH, style.stroke_width)?;

    if let Some(fill) = style.fill_color {
        map.insert(KEY_HAS_FILL, true)?;
        map.insert(KEY_FILL_R, fill.r as i64)?;
        map.insert(KEY_FILL_G, fill.g as i64)?;
        map.insert(KEY_FILL_B, fill.b as i64)?;
        map.insert(KEY_FILL_A, fill.a as i64)?;
    } else {
        map.insert(KEY_HAS_FILL, false)?;
    }

    Ok(())
}

/// Convert a Loro map stored under `id` back into a record.
///
/// Fails with [`SyncError::MalformedRecord`] when a field required by the
/// record's kind is missing or has the wrong type.
pub fn record_from_loro(id: &ObjectId, map: &LoroMapValue) -> SyncResult<ShapeRecord> {
    let fields = FieldReader { id, map };
    let tag = fields.string(KEY_TYPE)?;
    let kind = ShapeKind::parse(&tag).ok_or_else(|| SyncError::MalformedRecord {
        object_id: id.clone(),
        reason: format!("unknown kind `{tag}`"),
    })?;

    let geometry = match kind {
        ShapeKind::Rectangle => ShapeGeometry::Rectangle {
            position: fields.point(KEY_X, KEY_Y)?,
            width: fields.double(KEY_WIDTH)?,
            height: fields.double(KEY_HEIGHT)?,
            rotation: get_double(map, KEY_ROTATION).unwrap_or(0.0),
        },
        ShapeKind::Triangle => ShapeGeometry::Triangle {
            position: fields.point(KEY_X, KEY_Y)?,
            width: fields.double(KEY_WIDTH)?,
            height: fields.double(KEY_HEIGHT)?,
            rotation: get_double(map, KEY_ROTATION).unwrap_or(0.0),
        },
        ShapeKind::Ellipse => ShapeGeometry::Ellipse {
            center: fields.point(KEY_X, KEY_Y)?,
            radius_x: fields.double(KEY_WIDTH)?,
            radius_y: fields.double(KEY_HEIGHT)?,
            rotation: get_double(map, KEY_ROTATION).unwrap_or(0.0),
        },
        ShapeKind::Line => ShapeGeometry::Line {
            start: fields.point(KEY_START_X, KEY_START_Y)?,
            end: fields.point(KEY_END_X, KEY_END_Y)?,
        },
        ShapeKind::Path => ShapeGeometry::Path {
            points: points_from_loro(&fields)?,
        },
        ShapeKind::Text => ShapeGeometry::Text {
            position: fields.point(KEY_X, KEY_Y)?,
            content: fields.string(KEY_CONTENT)?,
            font: TextFont {
                size: get_double(map, KEY_FONT_SIZE).unwrap_or(TextFont::DEFAULT_SIZE),
                family: get_i64(map, KEY_FONT_FAMILY).map(i64_to_font_family).unwrap_or_default(),
                weight: get_i64(map, KEY_FONT_WEIGHT).map(i64_to_font_weight).unwrap_or_default(),
            },
        },
        ShapeKind::Image => ShapeGeometry::Image {
            position: fields.point(KEY_X, KEY_Y)?,
            width: fields.double(KEY_WIDTH)?,
            height: fields.double(KEY_HEIGHT)?,
            source: fields.string(KEY_SOURCE)?,
        },
    };

    Ok(ShapeRecord {
        object_id: id.clone(),
        geometry,
        style: style_from_loro(&fields)?,
    })
}

fn points_from_loro(fields: &FieldReader<'_>) -> SyncResult<Vec<Point>> {
    let Some(LoroValue::List(points_list)) = fields.map.get(KEY_POINTS) else {
        return Err(fields.missing(KEY_POINTS));
    };

    let coord = |value: Option<&LoroValue>| match value {
        Some(LoroValue::Double(d)) => Some(*d),
        Some(LoroValue::I64(i)) => Some(*i as f64),
        _ => None,
    };

    points_list
        .iter()
        .map(|p| match p {
            LoroValue::List(coords) if coords.len() >= 2 => {
                Some(Point::new(coord(coords.first())?, coord(coords.get(1))?))
            }
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| fields.missing(KEY_POINTS))
}

fn style_from_loro(fields: &FieldReader<'_>) -> SyncResult<ShapeStyle> {
    let stroke_color = SerializableColor::new(
        fields.channel(KEY_STROKE_R)?,
        fields.channel(KEY_STROKE_G)?,
        fields.channel(KEY_STROKE_B)?,
        fields.channel(KEY_STROKE_A)?,
    );
    let stroke_width = fields.double(KEY_STROKE_WIDTH)?;

    let fill_color = if get_bool(fields.map, KEY_HAS_FILL).unwrap_or(false) {
        Some(SerializableColor::new(
            fields.channel(KEY_FILL_R)?,
            fields.channel(KEY_FILL_G)?,
            fields.channel(KEY_FILL_B)?,
            fields.channel(KEY_FILL_A)?,
        ))
    } else {
        None
    };

    Ok(ShapeStyle {
        stroke_color,
        stroke_width,
        fill_color,
    })
}

// Enum conversion helpers

fn font_family_to_i64(f: FontFamily) -> i64 {
    match f {
        FontFamily::Helvetica => 0,
        FontFamily::TimesNewRoman => 1,
        FontFamily::ComicSans => 2,
        FontFamily::BrushScript => 3,
    }
}

fn i64_to_font_family(v: i64) -> FontFamily {
    match v {
        1 => FontFamily::TimesNewRoman,
        2 => FontFamily::ComicSans,
        3 => FontFamily::BrushScript,
        _ => FontFamily::Helvetica,
    }
}

fn font_weight_to_i64(w: FontWeight) -> i64 {
    w.css_weight() as i64
}

fn i64_to_font_weight(v: i64) -> FontWeight {
    u16::try_from(v)
        .ok()
        .and_then(FontWeight::from_css_weight)
        .unwrap_or_default()
}

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub font_family: String,
    pub background: String,
    pub label_background: String,
    pub node_stroke: String,
    pub layer_guide: String,
}

impl Theme {
    pub fn light() -> Self {
        Self {
            font_family: "Inter, Segoe UI, system-ui, -apple-system, sans-serif".to_string(),
            background: "#FFFFFF".to_string(),
            label_background: "rgba(255,255,255,0.75)".to_string(),
            node_stroke: "none".to_string(),
            layer_guide: "#EEF2F8".to_string(),
        }
    }

    pub fn dark() -> Self {
        Self {
            font_family: "Inter, Segoe UI, system-ui, -apple-system, sans-serif".to_string(),
            background: "#14181F".to_string(),
            label_background: "rgba(20,24,31,0.75)".to_string(),
            node_stroke: "none".to_string(),
            layer_guide: "#1F2530".to_string(),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::light()
    }
}

/// RGBA color; serialized as `#RRGGBB` or `#RRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// `hue`, `saturation` and `value` are all in `0.0..=1.0`.
    pub fn from_hsv(hue: f32, saturation: f32, value: f32) -> Self {
        let h = hue.rem_euclid(1.0) * 6.0;
        let s = saturation.clamp(0.0, 1.0);
        let v = value.clamp(0.0, 1.0);
        let sector = h.floor();
        let f = h - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        let (r, g, b) = match sector as u8 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Self::rgb(to_channel(r), to_channel(g), to_channel(b))
    }

    /// Hue spread over the full circle from a 64-bit hash.
    pub fn from_hash(hash: u64, saturation: f32, value: f32) -> Self {
        let hue = (hash >> 11) as f64 / (1u64 << 53) as f64;
        Self::from_hsv(hue as f32, saturation, value)
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    pub fn hue(&self) -> f32 {
        let r = self.r as f32 / 255.0;
        let g = self.g as f32 / 255.0;
        let b = self.b as f32 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;
        if delta <= f32::EPSILON {
            return 0.0;
        }
        let h = if max == r {
            ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            (b - r) / delta + 2.0
        } else {
            (r - g) / delta + 4.0
        };
        h / 6.0
    }

    /// Same hue, new saturation/value.
    pub fn recolored(&self, saturation: f32, value: f32) -> Self {
        Self::from_hsv(self.hue(), saturation, value).with_alpha(self.a)
    }

    pub fn to_hex(&self) -> String {
        if self.a >= 1.0 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!(
                "#{:02X}{:02X}{:02X}{:02X}",
                self.r,
                self.g,
                self.b,
                to_channel(self.a)
            )
        }
    }

    pub fn parse_hex(input: &str) -> Option<Self> {
        let hex = input.trim().strip_prefix('#')?;
        let channel = |idx: usize| u8::from_str_radix(hex.get(idx..idx + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?).with_alpha(channel(6)? as f32 / 255.0)),
            _ => None,
        }
    }
}

fn to_channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Color::parse_hex(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid color `{raw}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_primaries() {
        assert_eq!(Color::from_hsv(0.0, 1.0, 1.0), Color::rgb(255, 0, 0));
        assert_eq!(Color::from_hsv(1.0 / 3.0, 1.0, 1.0), Color::rgb(0, 255, 0));
        assert_eq!(Color::from_hsv(2.0 / 3.0, 1.0, 1.0), Color::rgb(0, 0, 255));
    }

    #[test]
    fn hex_round_trip() {
        let c = Color::rgb(18, 52, 86).with_alpha(0.5);
        let parsed = Color::parse_hex(&c.to_hex()).unwrap();
        assert_eq!((parsed.r, parsed.g, parsed.b), (18, 52, 86));
        assert!((parsed.a - 0.5).abs() < 0.01);
        assert_eq!(Color::parse_hex("nope"), None);
    }

    #[test]
    fn recolor_keeps_hue() {
        let c = Color::from_hsv(0.3, 1.0, 1.0);
        let muted = c.recolored(0.4, 0.6);
        assert!((muted.hue() - c.hue()).abs() < 0.01);
    }

    #[test]
    fn hash_colors_are_stable() {
        assert_eq!(
            Color::from_hash(0xDEADBEEF, 1.0, 1.0),
            Color::from_hash(0xDEADBEEF, 1.0, 1.0)
        );
    }
}

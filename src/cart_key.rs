use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Composite identity of a cart line: product plus the variant axes.
///
/// The encoded form `"{product_id}-{size}"` or
/// `"{product_id}-{size}-{color}"` is the only identifier the presentation
/// layer passes back for remove/update, so encoding must round-trip. The
/// uuid occupies a fixed-width leading segment, which keeps parsing
/// unambiguous even when the color itself contains hyphens. Sizes must
/// not contain hyphens; variant and cart creation reject them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartKey {
    pub product_id: Uuid,
    pub size: String,
    pub color: Option<String>,
}

impl CartKey {
    pub fn new(product_id: Uuid, size: impl Into<String>, color: Option<String>) -> Self {
        Self {
            product_id,
            size: size.into(),
            color,
        }
    }
}

impl fmt::Display for CartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.color {
            Some(color) => write!(f, "{}-{}-{}", self.product_id, self.size, color),
            None => write!(f, "{}-{}", self.product_id, self.size),
        }
    }
}

const UUID_LEN: usize = 36;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCartKeyError;

impl fmt::Display for ParseCartKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("malformed cart key")
    }
}

impl std::error::Error for ParseCartKeyError {}

impl FromStr for CartKey {
    type Err = ParseCartKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() <= UUID_LEN + 1 || !s.is_char_boundary(UUID_LEN) {
            return Err(ParseCartKeyError);
        }
        let (id_part, rest) = s.split_at(UUID_LEN);
        let product_id = Uuid::parse_str(id_part).map_err(|_| ParseCartKeyError)?;
        let rest = rest.strip_prefix('-').ok_or(ParseCartKeyError)?;

        let (size, color) = match rest.split_once('-') {
            Some((size, color)) if !color.is_empty() => (size, Some(color.to_string())),
            Some(_) => return Err(ParseCartKeyError),
            None => (rest, None),
        };
        if size.is_empty() {
            return Err(ParseCartKeyError);
        }

        Ok(CartKey {
            product_id,
            size: size.to_string(),
            color,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid() -> Uuid {
        Uuid::parse_str("7f2c1a9e-9b1d-4a4e-8f63-0d3b5a2c1e10").unwrap()
    }

    #[test]
    fn round_trips_without_color() {
        let key = CartKey::new(pid(), "M", None);
        let parsed: CartKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn round_trips_with_color() {
        let key = CartKey::new(pid(), "XL", Some("black".into()));
        let parsed: CartKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn color_may_contain_hyphens() {
        let key = CartKey::new(pid(), "S", Some("navy-blue".into()));
        let parsed: CartKey = key.to_string().parse().unwrap();
        assert_eq!(parsed.color.as_deref(), Some("navy-blue"));
        assert_eq!(parsed.size, "S");
    }

    #[test]
    fn first_hyphen_after_size_starts_the_color() {
        // sizes are hyphen-free by construction, so the first separator
        // after the uuid always ends the size
        let parsed: CartKey = format!("{}-X-L", pid()).parse().unwrap();
        assert_eq!(parsed.size, "X");
        assert_eq!(parsed.color.as_deref(), Some("L"));
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<CartKey>().is_err());
        assert!("not-a-key".parse::<CartKey>().is_err());
        assert!(pid().to_string().parse::<CartKey>().is_err());
        // trailing separator without a size
        assert!(format!("{}-", pid()).parse::<CartKey>().is_err());
        // empty color segment
        assert!(format!("{}-M-", pid()).parse::<CartKey>().is_err());
    }
}

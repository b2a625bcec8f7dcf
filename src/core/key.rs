use std::fmt;

/// Application-supplied routing key.
///
/// Keys are built explicitly by the caller; the routing strategy matches on the variant
/// instead of inspecting a runtime type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShardKey {
    Int(i64),
    Text(Vec<u8>),
    /// A key shape with no routing rule; carries the name of the shape for diagnostics.
    Unsupported(String),
}

impl ShardKey {
    pub fn unsupported(kind: impl Into<String>) -> Self {
        Self::Unsupported(kind.into())
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Int(_) => "INTEGER",
            Self::Text(_) => "TEXT",
            Self::Unsupported(kind) => kind,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Text(bytes) => write!(f, "'{}'", String::from_utf8_lossy(bytes)),
            Self::Unsupported(kind) => write!(f, "<unsupported {}>", kind),
        }
    }
}

macro_rules! impl_from_lossless_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ShardKey {
                fn from(v: $t) -> Self {
                    ShardKey::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_lossless_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! impl_from_wide_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ShardKey {
                fn from(v: $t) -> Self {
                    match i64::try_from(v) {
                        Ok(v) => ShardKey::Int(v),
                        Err(_) => ShardKey::Unsupported(format!(
                            "{} value {} exceeds i64 range",
                            stringify!($t),
                            v
                        )),
                    }
                }
            }
        )*
    };
}

impl_from_wide_int!(isize, usize, u64);

impl From<&str> for ShardKey {
    fn from(v: &str) -> Self {
        ShardKey::Text(v.as_bytes().to_vec())
    }
}

impl From<String> for ShardKey {
    fn from(v: String) -> Self {
        ShardKey::Text(v.into_bytes())
    }
}

impl From<&String> for ShardKey {
    fn from(v: &String) -> Self {
        ShardKey::from(v.as_str())
    }
}

impl From<&[u8]> for ShardKey {
    fn from(v: &[u8]) -> Self {
        ShardKey::Text(v.to_vec())
    }
}

impl From<Vec<u8>> for ShardKey {
    fn from(v: Vec<u8>) -> Self {
        ShardKey::Text(v)
    }
}

impl From<&ShardKey> for ShardKey {
    fn from(v: &ShardKey) -> Self {
        v.clone()
    }
}

/// Dynamic keys, e.g. an id pulled out of a JSON request body.
///
/// Integral numbers and strings route; floats, booleans, null, arrays and objects do not.
impl From<&serde_json::Value> for ShardKey {
    fn from(v: &serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match v {
            Json::Number(n) => match n.as_i64() {
                Some(i) => ShardKey::Int(i),
                None => ShardKey::unsupported(format!("JSON number {}", n)),
            },
            Json::String(s) => ShardKey::from(s.as_str()),
            Json::Null => ShardKey::unsupported("JSON null"),
            Json::Bool(_) => ShardKey::unsupported("JSON boolean"),
            Json::Array(_) => ShardKey::unsupported("JSON array"),
            Json::Object(_) => ShardKey::unsupported("JSON object"),
        }
    }
}

impl From<serde_json::Value> for ShardKey {
    fn from(v: serde_json::Value) -> Self {
        ShardKey::from(&v)
    }
}

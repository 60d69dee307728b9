//! Column type tags

use serde::{Deserialize, Serialize};

/// Declared type of a column, restricted to the types the codec supports
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeTag {
    Text,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Boolean,
    Timestamp,
    Uuid,
    Blob,
    List(Box<TypeTag>),
    Set(Box<TypeTag>),
    Map(Box<TypeTag>, Box<TypeTag>),
}

impl TypeTag {
    pub fn list(element: TypeTag) -> Self {
        TypeTag::List(Box::new(element))
    }

    pub fn set(element: TypeTag) -> Self {
        TypeTag::Set(Box::new(element))
    }

    pub fn map(key: TypeTag, value: TypeTag) -> Self {
        TypeTag::Map(Box::new(key), Box::new(value))
    }

    /// Check if this is a list, set or map
    pub fn is_collection(&self) -> bool {
        matches!(self, TypeTag::List(_) | TypeTag::Set(_) | TypeTag::Map(_, _))
    }
}

impl std::str::FromStr for TypeTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();

        if let Some(inner) = strip_wrapper(&lower, "frozen") {
            return inner.parse();
        }
        if let Some(inner) = strip_wrapper(&lower, "list") {
            return Ok(TypeTag::list(inner.parse()?));
        }
        if let Some(inner) = strip_wrapper(&lower, "set") {
            return Ok(TypeTag::set(inner.parse()?));
        }
        if let Some(inner) = strip_wrapper(&lower, "map") {
            let (key, value) = split_top_level(inner)
                .ok_or_else(|| format!("Malformed map type: {}", trimmed))?;
            return Ok(TypeTag::map(key.parse()?, value.parse()?));
        }

        match lower.as_str() {
            "text" | "varchar" | "ascii" => Ok(TypeTag::Text),
            "tinyint" => Ok(TypeTag::TinyInt),
            "smallint" => Ok(TypeTag::SmallInt),
            "int" => Ok(TypeTag::Int),
            "bigint" => Ok(TypeTag::BigInt),
            "float" => Ok(TypeTag::Float),
            "double" => Ok(TypeTag::Double),
            "boolean" => Ok(TypeTag::Boolean),
            "timestamp" => Ok(TypeTag::Timestamp),
            "uuid" | "timeuuid" => Ok(TypeTag::Uuid),
            "blob" => Ok(TypeTag::Blob),
            _ => Err(format!("Unsupported column type: {}", trimmed)),
        }
    }
}

/// `name<inner>` -> `inner`
fn strip_wrapper<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    s.strip_prefix(name)?
        .trim_start()
        .strip_prefix('<')?
        .strip_suffix('>')
}

/// Split `k, v` at the comma that is not nested inside angle brackets
fn split_top_level(s: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, ch) in s.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => return Some((&s[..i], &s[i + 1..])),
            _ => {}
        }
    }
    None
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeTag::Text => write!(f, "text"),
            TypeTag::TinyInt => write!(f, "tinyint"),
            TypeTag::SmallInt => write!(f, "smallint"),
            TypeTag::Int => write!(f, "int"),
            TypeTag::BigInt => write!(f, "bigint"),
            TypeTag::Float => write!(f, "float"),
            TypeTag::Double => write!(f, "double"),
            TypeTag::Boolean => write!(f, "boolean"),
            TypeTag::Timestamp => write!(f, "timestamp"),
            TypeTag::Uuid => write!(f, "uuid"),
            TypeTag::Blob => write!(f, "blob"),
            TypeTag::List(e) => write!(f, "list<{}>", e),
            TypeTag::Set(e) => write!(f, "set<{}>", e),
            TypeTag::Map(k, v) => write!(f, "map<{}, {}>", k, v),
        }
    }
}

impl TryFrom<String> for TypeTag {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        tag.to_string()
    }
}

/// Role of a column in the table's primary key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    #[default]
    Regular,
    PartitionKey,
    ClusteringKey,
}

impl KeyKind {
    pub fn is_key(self) -> bool {
        !matches!(self, KeyKind::Regular)
    }
}

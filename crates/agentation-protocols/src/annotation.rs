//! Annotation types produced by the annotation UI.
//!
//! An annotation is either tied to one element ([`SingleAnnotation`]) or to a
//! set of elements ([`GroupAnnotation`]). Both carry free-text feedback.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Page-relative position of an annotation marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub top: f64,
    pub left: f64,
}

/// Bounding box enclosing all elements of a group annotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// Annotation attached to a single element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleAnnotation {
    pub id: u64,
    pub selector: String,
    #[serde(default)]
    pub description: String,
    pub feedback: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub timestamp: String,
    /// Design vocabulary references; ids before expansion, prompt text after.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub design_terms: Vec<String>,
}

/// Annotation attached to a set of elements.
///
/// `selectors` and `descriptions` are parallel lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAnnotation {
    pub id: u64,
    pub selectors: Vec<String>,
    #[serde(default)]
    pub descriptions: Vec<String>,
    pub feedback: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub design_terms: Vec<String>,
}

/// A single or group annotation.
///
/// On the wire both variants carry an `isGroup` flag. When the flag is
/// absent the variant is recognised by shape: group annotations carry
/// `selectors`, single annotations carry `selector`.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Group(GroupAnnotation),
    Single(SingleAnnotation),
}

#[derive(Serialize)]
struct Flagged<'a, T> {
    #[serde(rename = "isGroup")]
    is_group: bool,
    #[serde(flatten)]
    annotation: &'a T,
}

impl Serialize for Annotation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Annotation::Group(annotation) => Flagged {
                is_group: true,
                annotation,
            }
            .serialize(serializer),
            Annotation::Single(annotation) => Flagged {
                is_group: false,
                annotation,
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Annotation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let is_group = match value.get("isGroup") {
            Some(Value::Bool(flag)) => *flag,
            _ => value.get("selectors").is_some(),
        };

        let annotation = if is_group {
            GroupAnnotation::deserialize(value).map(Annotation::Group)
        } else {
            SingleAnnotation::deserialize(value).map(Annotation::Single)
        };
        annotation.map_err(serde::de::Error::custom)
    }
}

impl Annotation {
    /// Create a single-element annotation.
    pub fn single(id: u64, selector: impl Into<String>, feedback: impl Into<String>) -> Self {
        Annotation::Single(SingleAnnotation {
            id,
            selector: selector.into(),
            description: String::new(),
            feedback: feedback.into(),
            position: Position::default(),
            timestamp: String::new(),
            design_terms: Vec::new(),
        })
    }

    /// Create a group annotation from `(selector, description)` pairs.
    pub fn group<I, S, D>(id: u64, elements: I, feedback: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<String>,
        D: Into<String>,
    {
        let (selectors, descriptions) = elements
            .into_iter()
            .map(|(s, d)| (s.into(), d.into()))
            .unzip();

        Annotation::Group(GroupAnnotation {
            id,
            selectors,
            descriptions,
            feedback: feedback.into(),
            position: Position::default(),
            bounding_box: BoundingBox::default(),
            timestamp: String::new(),
            design_terms: Vec::new(),
        })
    }

    /// Set the human description of a single annotation. No-op for groups.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        if let Annotation::Single(single) = &mut self {
            single.description = description.into();
        }
        self
    }

    /// Attach design term references.
    pub fn with_design_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.design_terms_mut() = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(&self) -> u64 {
        match self {
            Annotation::Single(a) => a.id,
            Annotation::Group(a) => a.id,
        }
    }

    pub fn feedback(&self) -> &str {
        match self {
            Annotation::Single(a) => &a.feedback,
            Annotation::Group(a) => &a.feedback,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Annotation::Group(_))
    }

    /// Selectors of every annotated element.
    pub fn selectors(&self) -> Vec<&str> {
        match self {
            Annotation::Single(a) => vec![a.selector.as_str()],
            Annotation::Group(a) => a.selectors.iter().map(String::as_str).collect(),
        }
    }

    pub fn design_terms(&self) -> &[String] {
        match self {
            Annotation::Single(a) => &a.design_terms,
            Annotation::Group(a) => &a.design_terms,
        }
    }

    pub fn design_terms_mut(&mut self) -> &mut Vec<String> {
        match self {
            Annotation::Single(a) => &mut a.design_terms,
            Annotation::Group(a) => &mut a.design_terms,
        }
    }
}

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::colors::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Background,
    Primary,
    Secondary,
    Accent,
    Text,
    #[default]
    Other,
}

/// Attributes of one layer as sent by clients. `name` is only read in the
/// list form; in the object form the key is the name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayerSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Role,
    /// Relative size of the region; larger layers are colored first.
    #[serde(default)]
    pub area: Option<f32>,
    #[serde(default)]
    pub contrast_with: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub role: Role,
    pub area: f32,
    pub contrast_with: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LayerItem {
    Name(String),
    Spec(LayerSpec),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LayersRepr {
    Map(BTreeMap<String, Option<LayerSpec>>),
    List(Vec<LayerItem>),
}

/// Validated set of layers: names are unique and non-empty, areas are
/// finite and non-negative, and `contrast_with` names an existing layer
/// without forming a cycle.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "LayersRepr")]
pub struct Layers {
    layers: Vec<Layer>,
}

impl TryFrom<LayersRepr> for Layers {
    type Error = String;

    fn try_from(repr: LayersRepr) -> Result<Self, Self::Error> {
        let specs: Vec<(String, LayerSpec)> = match repr {
            LayersRepr::Map(map) => map
                .into_iter()
                .map(|(name, spec)| (name, spec.unwrap_or_default()))
                .collect(),
            LayersRepr::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    LayerItem::Name(name) => Ok((name, LayerSpec::default())),
                    LayerItem::Spec(spec) => match spec.name.clone() {
                        Some(name) => Ok((name, spec)),
                        None => Err(format!("layers[{}] has no name", i)),
                    },
                })
                .collect::<Result<_, _>>()?,
        };
        Layers::new(
            specs
                .into_iter()
                .map(|(name, spec)| Layer {
                    name,
                    role: spec.role,
                    area: spec.area.unwrap_or(0.0),
                    contrast_with: spec.contrast_with,
                })
                .collect(),
        )
    }
}

impl Layers {
    pub fn new(layers: Vec<Layer>) -> Result<Layers, String> {
        let mut names = BTreeSet::new();
        for layer in &layers {
            if layer.name.trim().is_empty() {
                return Err("layer names must not be empty".into());
            }
            if !names.insert(layer.name.as_str()) {
                return Err(format!("duplicate layer '{}'", layer.name));
            }
            if !layer.area.is_finite() || layer.area < 0.0 {
                return Err(format!("layer '{}' has invalid area {}", layer.name, layer.area));
            }
        }
        for layer in &layers {
            if let Some(target) = &layer.contrast_with {
                if !names.contains(target.as_str()) {
                    return Err(format!(
                        "layer '{}' wants contrast with unknown layer '{}'",
                        layer.name, target
                    ));
                }
                if target == &layer.name {
                    return Err(format!("layer '{}' cannot contrast with itself", layer.name));
                }
            }
        }
        let layers = Layers { layers };
        for layer in &layers.layers {
            // A layer on a cycle gets back to itself within `len` steps.
            let mut current = layer;
            for _ in 0..=layers.len() {
                match current.contrast_with.as_deref().and_then(|t| layers.get(t)) {
                    Some(next) => current = next,
                    None => break,
                }
                if current.name == layer.name {
                    return Err(format!("layer '{}' is part of a contrast_with cycle", layer.name));
                }
            }
        }
        Ok(layers)
    }

    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Body of `POST /assign_colors`.
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub layers: Layers,
    pub palette: Vec<Color>,
}

/// Layer name → chosen color, serialized as `{"layer": "#RRGGBB"}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Assignment(pub BTreeMap<String, Color>);

impl Assignment {
    pub fn get(&self, layer: &str) -> Option<Color> {
        self.0.get(layer).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Layers, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[test]
    fn accepts_object_form() {
        let layers = parse(r#"{"bg": {"role": "background", "area": 0.7}, "logo": null}"#).unwrap();
        assert_eq!(layers.len(), 2);
        let bg = layers.iter().find(|l| l.name == "bg").unwrap();
        assert_eq!(bg.role, Role::Background);
        assert_eq!(bg.area, 0.7);
        let logo = layers.iter().find(|l| l.name == "logo").unwrap();
        assert_eq!(logo.role, Role::Other);
    }

    #[test]
    fn accepts_list_form() {
        let layers = parse(r#"["strap", {"name": "body", "role": "primary"}]"#).unwrap();
        let names: Vec<&str> = layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["strap", "body"]);
        assert_eq!(layers.iter().nth(1).unwrap().role, Role::Primary);
    }

    #[test]
    fn rejects_invalid_layers() {
        assert!(parse(r#"["a", "a"]"#).is_err());
        assert!(parse(r#"[{"role": "text"}]"#).is_err());
        assert!(parse(r#"{"a": {"role": "sparkly"}}"#).is_err());
        assert!(parse(r#"{"a": {"area": -1.0}}"#).is_err());
        assert!(parse(r#"{"a": {"contrast_with": "ghost"}}"#).is_err());
        assert!(parse(r#"{"a": {"contrast_with": "a"}}"#).is_err());
        assert!(parse(r#"{"a": {"contrast_with": "b"}, "b": {"contrast_with": "c"}, "c": {"contrast_with": "a"}}"#).is_err());
        assert!(parse(r#"42"#).is_err());
    }

    #[test]
    fn contrast_chains_without_cycles_are_accepted() {
        let layers = parse(
            r#"{"bg": {"role": "background"}, "a": {"role": "text", "contrast_with": "b"}, "b": {"role": "text", "contrast_with": "bg"}}"#,
        )
        .unwrap();
        assert_eq!(layers.get("a").unwrap().contrast_with.as_deref(), Some("b"));
        assert!(layers.get("missing").is_none());
    }

    #[test]
    fn request_requires_both_fields() {
        let ok: AssignRequest = serde_json::from_str(r##"{"layers": ["a"], "palette": ["#000000"]}"##).unwrap();
        assert_eq!(ok.palette.len(), 1);
        assert!(serde_json::from_str::<AssignRequest>(r#"{"layers": ["a"]}"#).is_err());
    }

    #[test]
    fn assignment_serializes_as_object() {
        let mut map = BTreeMap::new();
        map.insert("bg".to_owned(), Color::new(255, 255, 255));
        let json = serde_json::to_value(Assignment(map)).unwrap();
        assert_eq!(json, serde_json::json!({"bg": "#FFFFFF"}));
    }
}

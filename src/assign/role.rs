use std::collections::{BTreeMap, BTreeSet};

use crate::assign::schema::{Assignment, Layer, Layers, Role};
use crate::assign::ColorAssigner;
use crate::colors::color::{hue_distance, Color};
use crate::error::AssignError;

/// Greedy role-driven assignment.
///
/// Backgrounds take the most neutral color, primary/secondary/accent layers
/// the most saturated unused colors, `other` layers the most neutral unused
/// ones, and text layers whatever reads best against the layer they sit on.
/// Colors are reused only once every palette entry has been handed out.
#[derive(Debug, Clone, Default)]
pub struct RoleAssigner;

const NEUTRAL_CHROMA: f32 = 10.0;

fn role_rank(role: Role) -> u8 {
    match role {
        Role::Background => 0,
        Role::Primary => 1,
        Role::Secondary => 2,
        Role::Accent => 3,
        Role::Other => 4,
        Role::Text => 5,
    }
}

/// Number of text layers between `layer` and the end of its `contrast_with`
/// chain. Text layers are colored in increasing depth so a target always
/// has its color before the layers reading against it.
fn text_depth(layer: &Layer, layers: &Layers) -> usize {
    if layer.role != Role::Text {
        return 0;
    }
    let mut depth = 0;
    let mut current = layer;
    // `Layers` rejects cycles; the bound only guards the loop.
    for _ in 0..layers.len() {
        match current.contrast_with.as_deref().and_then(|t| layers.get(t)) {
            Some(next) if next.role == Role::Text => {
                depth += 1;
                current = next;
            }
            _ => break,
        }
    }
    depth
}

/// First candidate with the highest score.
fn best_by(candidates: &[Color], score: impl Fn(&Color) -> f32) -> Option<Color> {
    let mut best: Option<(Color, f32)> = None;
    for c in candidates {
        let s = score(c);
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((*c, s));
        }
    }
    best.map(|(c, _)| c)
}

struct Pool {
    palette: Vec<Color>,
    used: BTreeSet<Color>,
}

impl Pool {
    fn new(palette: &[Color]) -> Pool {
        let mut seen = BTreeSet::new();
        let palette = palette.iter().copied().filter(|c| seen.insert(*c)).collect();
        Pool { palette, used: BTreeSet::new() }
    }

    /// Unused colors, or the whole palette once everything has been used.
    fn available(&self) -> Vec<Color> {
        let unused: Vec<Color> = self.palette.iter().copied().filter(|c| !self.used.contains(c)).collect();
        if unused.is_empty() { self.palette.clone() } else { unused }
    }

    fn take(&mut self, color: Color) -> Color {
        self.used.insert(color);
        color
    }
}

impl ColorAssigner for RoleAssigner {
    fn assign(&self, palette: &[Color], layers: &Layers) -> Result<Assignment, AssignError> {
        if palette.is_empty() {
            return Err(AssignError::EmptyPalette);
        }

        let mut order: Vec<&Layer> = layers.iter().collect();
        order.sort_by(|a, b| {
            role_rank(a.role)
                .cmp(&role_rank(b.role))
                .then(text_depth(a, layers).cmp(&text_depth(b, layers)))
                .then(b.area.total_cmp(&a.area))
                .then(a.name.cmp(&b.name))
        });

        let mut pool = Pool::new(palette);
        let mut chosen: BTreeMap<String, Color> = BTreeMap::new();
        let mut background: Option<Color> = None;
        let mut primary: Option<Color> = None;

        for layer in order {
            let available = pool.available();
            let pick = match layer.role {
                Role::Background => best_by(&available, |c| -c.chroma() * 1000.0 + c.lightness()),
                Role::Primary | Role::Accent => best_by(&available, |c| c.chroma()),
                Role::Secondary => match primary {
                    Some(p) => {
                        let ph = p.hue_degrees();
                        best_by(&available, |c| {
                            // Hue is noise on near-greys; rank them below any chromatic color.
                            if c.chroma() < NEUTRAL_CHROMA {
                                c.chroma()
                            } else {
                                hue_distance(c.hue_degrees(), ph) * 1000.0 + c.chroma()
                            }
                        })
                    }
                    None => best_by(&available, |c| c.chroma()),
                },
                Role::Other => best_by(&available, |c| -c.chroma()),
                Role::Text => {
                    let reference = layer
                        .contrast_with
                        .as_ref()
                        .and_then(|name| chosen.get(name).copied())
                        .or(background);
                    match reference {
                        Some(r) => best_by(&pool.palette, |c| c.contrast_ratio(&r)),
                        None => best_by(&pool.palette, |c| -c.lightness()),
                    }
                }
            };
            let color = pool.take(pick.ok_or(AssignError::EmptyPalette)?);

            match layer.role {
                Role::Background if background.is_none() => background = Some(color),
                Role::Primary if primary.is_none() => primary = Some(color),
                _ => {}
            }
            chosen.insert(layer.name.clone(), color);
        }

        Ok(Assignment(chosen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Color = Color::new(250, 250, 250);
    const NAVY: Color = Color::new(20, 30, 90);
    const RED: Color = Color::new(220, 30, 40);
    const TEAL: Color = Color::new(20, 160, 150);
    const SAND: Color = Color::new(200, 180, 150);

    fn layers(json: &str) -> Layers {
        serde_json::from_str(json).unwrap()
    }

    fn palette() -> Vec<Color> {
        vec![NAVY, RED, WHITE, TEAL, SAND]
    }

    #[test]
    fn background_is_most_neutral() {
        let out = RoleAssigner.assign(&palette(), &layers(r#"{"bg": {"role": "background"}}"#)).unwrap();
        assert_eq!(out.get("bg"), Some(WHITE));
    }

    #[test]
    fn primary_is_most_saturated_and_secondary_contrasts_in_hue() {
        let out = RoleAssigner
            .assign(&palette(), &layers(r#"{"a": {"role": "primary"}, "b": {"role": "secondary"}}"#))
            .unwrap();
        assert_eq!(out.get("a"), Some(RED));
        assert_eq!(out.get("b"), Some(TEAL));
    }

    #[test]
    fn text_maximizes_contrast_with_target() {
        let json = r#"{
            "bg": {"role": "background"},
            "banner": {"role": "primary"},
            "caption": {"role": "text"},
            "label": {"role": "text", "contrast_with": "banner"}
        }"#;
        let out = RoleAssigner.assign(&palette(), &layers(json)).unwrap();
        let bg = out.get("bg").unwrap();
        let caption = out.get("caption").unwrap();
        assert_eq!(caption, NAVY);
        for c in palette() {
            assert!(caption.contrast_ratio(&bg) >= c.contrast_ratio(&bg));
        }
        let banner = out.get("banner").unwrap();
        let label = out.get("label").unwrap();
        for c in palette() {
            assert!(label.contrast_ratio(&banner) >= c.contrast_ratio(&banner));
        }
    }

    #[test]
    fn text_on_text_is_colored_after_its_target() {
        let palette = [Color::new(250, 250, 250), Color::new(10, 10, 10), Color::new(120, 120, 120)];
        let json = r#"{
            "bg": {"role": "background"},
            "a": {"role": "text", "contrast_with": "b"},
            "b": {"role": "text", "contrast_with": "bg"}
        }"#;
        let out = RoleAssigner.assign(&palette, &layers(json)).unwrap();
        let bg = out.get("bg").unwrap();
        let a = out.get("a").unwrap();
        let b = out.get("b").unwrap();
        assert_eq!(bg, Color::new(250, 250, 250));
        assert_eq!(b, Color::new(10, 10, 10));
        assert_eq!(a, Color::new(250, 250, 250));
        for c in palette {
            assert!(a.contrast_ratio(&b) >= c.contrast_ratio(&b));
        }
    }

    #[test]
    fn text_without_reference_is_darkest() {
        let out = RoleAssigner.assign(&palette(), &layers(r#"["title"]"#)).unwrap();
        assert_eq!(out.get("title"), Some(WHITE));
        let out = RoleAssigner.assign(&palette(), &layers(r#"{"t": {"role": "text"}}"#)).unwrap();
        assert_eq!(out.get("t"), Some(NAVY));
    }

    #[test]
    fn distinct_colors_until_palette_is_exhausted() {
        let out = RoleAssigner.assign(&palette(), &layers(r#"["a", "b", "c", "d", "e", "f", "g"]"#)).unwrap();
        assert_eq!(out.0.len(), 7);
        let first_five: BTreeSet<Color> = ["a", "b", "c", "d", "e"].iter().map(|n| out.get(n).unwrap()).collect();
        assert_eq!(first_five.len(), 5);
    }

    #[test]
    fn larger_areas_are_served_first() {
        let out = RoleAssigner
            .assign(&palette(), &layers(r#"{"small": {"area": 0.1}, "large": {"area": 0.9}}"#))
            .unwrap();
        assert_eq!(out.get("large"), Some(WHITE));
        assert_ne!(out.get("small"), Some(WHITE));
    }

    #[test]
    fn empty_palette_is_an_error() {
        assert!(matches!(
            RoleAssigner.assign(&[], &layers(r#"["a"]"#)),
            Err(AssignError::EmptyPalette)
        ));
    }

    #[test]
    fn no_layers_gives_empty_assignment() {
        let out = RoleAssigner.assign(&palette(), &Layers::default()).unwrap();
        assert!(out.0.is_empty());
    }

    #[test]
    fn duplicate_palette_entries_collapse() {
        let out = RoleAssigner.assign(&[RED, RED, NAVY], &layers(r#"["a", "b"]"#)).unwrap();
        assert_ne!(out.get("a"), out.get("b"));
    }
}

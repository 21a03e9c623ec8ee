//! Morph-target write boundary.
//!
//! The engine only ever calls [`MorphWeightSink::set_morph_weight`]. Meshes
//! that do not declare a name simply ignore the write.

use std::collections::{BTreeMap, HashMap};

pub const MOUTH_OPEN: &str = "mouthOpen";
pub const MOUTH_SMILE: &str = "mouthSmile";

pub trait MorphWeightSink {
    fn set_morph_weight(&mut self, name: &str, value: f32);
}

impl<S: MorphWeightSink + ?Sized> MorphWeightSink for &mut S {
    fn set_morph_weight(&mut self, name: &str, value: f32) {
        (**self).set_morph_weight(name, value);
    }
}

impl<S: MorphWeightSink + ?Sized> MorphWeightSink for Box<S> {
    fn set_morph_weight(&mut self, name: &str, value: f32) {
        (**self).set_morph_weight(name, value);
    }
}

/// One mesh: a morph-target dictionary plus its influence array.
#[derive(Debug, Clone, Default)]
pub struct MorphMesh {
    name: String,
    dictionary: HashMap<String, usize>,
    influences: Vec<f32>,
}

impl MorphMesh {
    pub fn new<I, S>(name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut mesh = Self {
            name: name.into(),
            ..Self::default()
        };
        for target in targets {
            let target = target.into();
            if mesh.dictionary.contains_key(&target) {
                continue;
            }
            mesh.dictionary.insert(target, mesh.influences.len());
            mesh.influences.push(0.0);
        }
        mesh
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_target(&self, name: &str) -> bool {
        self.dictionary.contains_key(name)
    }

    pub fn weight(&self, name: &str) -> Option<f32> {
        self.dictionary.get(name).map(|&i| self.influences[i])
    }

    pub fn influences(&self) -> &[f32] {
        &self.influences
    }

    pub fn target_count(&self) -> usize {
        self.influences.len()
    }
}

impl MorphWeightSink for MorphMesh {
    fn set_morph_weight(&mut self, name: &str, value: f32) {
        if let Some(&i) = self.dictionary.get(name) {
            self.influences[i] = sanitize_weight(value);
        }
    }
}

/// Every mesh of an avatar; a write lands on each mesh that declares the name.
#[derive(Debug, Clone, Default)]
pub struct AvatarRig {
    meshes: Vec<MorphMesh>,
}

impl AvatarRig {
    pub fn new(meshes: Vec<MorphMesh>) -> Self {
        Self { meshes }
    }

    pub fn push(&mut self, mesh: MorphMesh) {
        self.meshes.push(mesh);
    }

    pub fn meshes(&self) -> &[MorphMesh] {
        &self.meshes
    }

    pub fn mesh(&self, name: &str) -> Option<&MorphMesh> {
        self.meshes.iter().find(|m| m.name == name)
    }

    /// Weight of `name` on the first mesh declaring it.
    pub fn weight(&self, name: &str) -> Option<f32> {
        self.meshes.iter().find_map(|m| m.weight(name))
    }
}

impl MorphWeightSink for AvatarRig {
    fn set_morph_weight(&mut self, name: &str, value: f32) {
        for mesh in &mut self.meshes {
            mesh.set_morph_weight(name, value);
        }
    }
}

/// Flat name -> weight map. Accepts any name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphWeights {
    values: BTreeMap<String, f32>,
}

impl MorphWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> f32 {
        self.values.get(name).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl MorphWeightSink for MorphWeights {
    fn set_morph_weight(&mut self, name: &str, value: f32) {
        let value = sanitize_weight(value);
        match self.values.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.values.insert(name.to_string(), value);
            }
        }
    }
}

/// Standard Ready Player Me style head: mouth channels plus all visemes.
pub fn default_head_targets() -> Vec<&'static str> {
    let mut targets = vec![MOUTH_OPEN, MOUTH_SMILE];
    targets.extend(crate::viseme::VisemeId::RING.iter().map(|v| v.morph_name()));
    targets
}

fn sanitize_weight(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

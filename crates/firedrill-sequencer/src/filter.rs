use firedrill_events::ContactInfo;
use serde::{Deserialize, Serialize};

/// Highest physics layer index a mask can hold
pub const MAX_LAYER: u8 = 31;

/// Set of physics layers stored as a bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct LayerMask(u32);

impl LayerMask {
    pub const ALL: LayerMask = LayerMask(u32::MAX);
    pub const NONE: LayerMask = LayerMask(0);

    pub fn from_bits(bits: u32) -> Self {
        LayerMask(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Mask holding a single layer; `None` if the layer is out of range
    pub fn single(layer: u8) -> Option<Self> {
        (layer <= MAX_LAYER).then(|| LayerMask(1 << layer))
    }

    pub fn contains(&self, layer: u8) -> bool {
        layer <= MAX_LAYER && self.0 & (1 << layer) != 0
    }

    pub fn with(self, layer: u8) -> Self {
        match LayerMask::single(layer) {
            Some(bit) => LayerMask(self.0 | bit.0),
            None => self,
        }
    }

    pub fn layers(&self) -> Vec<u8> {
        (0..=MAX_LAYER).filter(|l| self.contains(*l)).collect()
    }
}

impl TryFrom<Vec<u8>> for LayerMask {
    type Error = String;

    fn try_from(layers: Vec<u8>) -> Result<Self, Self::Error> {
        layers.into_iter().try_fold(LayerMask::NONE, |mask, layer| {
            if layer > MAX_LAYER {
                Err(format!("layer {} is out of range 0..={}", layer, MAX_LAYER))
            } else {
                Ok(mask.with(layer))
            }
        })
    }
}

impl From<LayerMask> for Vec<u8> {
    fn from(mask: LayerMask) -> Self {
        mask.layers()
    }
}

/// Filter applied to physics contacts before a package fires
///
/// Every field is optional; an unset field accepts any contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerFilter {
    /// Only accept contacts whose other entity carries this tag
    #[serde(default, rename = "tag")]
    pub required_tag: Option<String>,
    /// Only accept contacts whose other entity is on one of these layers
    #[serde(default, rename = "layers")]
    pub required_layers: Option<LayerMask>,
    /// Only accept contacts whose other entity is this one or below it
    #[serde(default, rename = "root")]
    pub required_root: Option<String>,
}

impl TriggerFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.required_tag = Some(tag.into());
        self
    }

    pub fn with_layers(mut self, layers: LayerMask) -> Self {
        self.required_layers = Some(layers);
        self
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.required_root = Some(root.into());
        self
    }

    /// Blank tags and roots mean "don't care"
    pub fn normalized(mut self) -> Self {
        if self.required_tag.as_deref().is_some_and(|t| t.trim().is_empty()) {
            self.required_tag = None;
        }
        if self.required_root.as_deref().is_some_and(|r| r.trim().is_empty()) {
            self.required_root = None;
        }
        self
    }

    /// Check if this filter accepts the other party of a contact
    pub fn matches(&self, other: &ContactInfo) -> bool {
        if let Some(tag) = &self.required_tag {
            if !other.has_tag(tag) {
                return false;
            }
        }

        if let Some(layers) = &self.required_layers {
            if !layers.contains(other.layer) {
                return false;
            }
        }

        if let Some(root) = &self.required_root {
            if !other.is_under(root) {
                return false;
            }
        }

        true
    }
}

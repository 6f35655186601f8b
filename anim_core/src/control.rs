//! The per object animation context owning the pose cache and layers.
use std::sync::Arc;

use log::{debug, warn};
use smol_str::SmolStr;

use crate::{
    AnimActor, ClipTable, Locator, PoseCache, Skeleton, StateLayer,
    align::{AlignInterp, AnimAlignBlender, InstanceAlignTable},
    error::{CreatePoseCacheError, LayerError, RequestError},
    instance::InstanceId,
    layer::{AnimLayer, DEFAULT_LAYER_CAPACITY, FadeRequestParams, LayerConfig, SimpleLayer},
    request::{FadeToStateParams, RequestId},
};

/// Owns everything needed to animate a single object.
///
/// Layers are stepped together and applied to the [PoseCache] from lowest to
/// highest priority. The object align is resolved from the highest priority
/// non empty layer with [LayerConfig::drives_align] set.
#[derive(Debug)]
pub struct AnimControl {
    cache: PoseCache,
    clips: ClipTable,
    actor: Arc<AnimActor>,
    layers: Vec<AnimLayer>,
    align: Locator,
    scale: f32,
    align_interp: AlignInterp,
    instance_aligns: InstanceAlignTable,
    frame: u64,
}

impl AnimControl {
    pub fn new(
        skeleton: Arc<Skeleton>,
        clips: ClipTable,
        actor: Arc<AnimActor>,
    ) -> Result<Self, CreatePoseCacheError> {
        Ok(Self {
            cache: PoseCache::new(skeleton)?,
            clips,
            actor,
            layers: Vec::new(),
            align: Locator::IDENTITY,
            scale: 1.0,
            align_interp: AlignInterp::Linear,
            instance_aligns: InstanceAlignTable::new(DEFAULT_LAYER_CAPACITY),
            frame: 0,
        })
    }

    pub fn pose_cache(&self) -> &PoseCache {
        &self.cache
    }

    pub fn pose_cache_mut(&mut self) -> &mut PoseCache {
        &mut self.cache
    }

    pub fn clips(&self) -> &ClipTable {
        &self.clips
    }

    pub fn actor(&self) -> &Arc<AnimActor> {
        &self.actor
    }

    /// The number of completed steps.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// The world space object align.
    pub fn align(&self) -> Locator {
        self.align
    }

    /// Teleport the object and update the pose cache object transform.
    pub fn set_align(&mut self, align: Locator) {
        if align.is_finite() {
            self.align = align.normalized();
            self.cache.set_object_transform(self.align);
        } else {
            log::error!("Ignoring non finite align {align:?}");
            debug_assert!(align.is_finite());
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Uniform object scale applied to animated motion.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    pub fn set_align_interp(&mut self, interp: AlignInterp) {
        self.align_interp = interp;
    }

    /// The align of a state instance from the last step before blending.
    pub fn instance_align(&self, id: InstanceId) -> Option<Locator> {
        self.instance_aligns.get(id)
    }

    /// Add an empty layer ordered by priority after existing layers of the same priority.
    pub fn add_layer(&mut self, config: LayerConfig) -> Result<&mut AnimLayer, LayerError> {
        if self.layer(&config.name).is_some() {
            return Err(LayerError::DuplicateLayer(config.name));
        }

        debug!("Adding {} layer {:?}", config.kind, config.name);
        let index = self
            .layers
            .iter()
            .position(|l| l.priority() > config.priority)
            .unwrap_or(self.layers.len());
        self.layers
            .insert(index, AnimLayer::new(config, self.actor.clone()));
        Ok(&mut self.layers[index])
    }

    pub fn layers(&self) -> &[AnimLayer] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&AnimLayer> {
        self.layers.iter().find(|l| l.name() == name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut AnimLayer> {
        self.layers.iter_mut().find(|l| l.name() == name)
    }

    pub fn simple_layer(&self, name: &str) -> Result<&SimpleLayer, LayerError> {
        self.layer(name)
            .ok_or_else(|| LayerError::MissingLayer(name.into()))?
            .as_simple()
            .ok_or_else(|| LayerError::NotSimple(name.into()))
    }

    pub fn simple_layer_mut(&mut self, name: &str) -> Result<&mut SimpleLayer, LayerError> {
        self.layer_mut(name)
            .ok_or_else(|| LayerError::MissingLayer(name.into()))?
            .as_simple_mut()
            .ok_or_else(|| LayerError::NotSimple(name.into()))
    }

    pub fn state_layer(&self, name: &str) -> Result<&StateLayer, LayerError> {
        self.layer(name)
            .ok_or_else(|| LayerError::MissingLayer(name.into()))?
            .as_state()
            .ok_or_else(|| LayerError::NotState(name.into()))
    }

    pub fn state_layer_mut(&mut self, name: &str) -> Result<&mut StateLayer, LayerError> {
        self.layer_mut(name)
            .ok_or_else(|| LayerError::MissingLayer(name.into()))?
            .as_state_mut()
            .ok_or_else(|| LayerError::NotState(name.into()))
    }

    /// Start fading in `clip` on a simple layer.
    pub fn fade_to_anim(
        &mut self,
        layer: &str,
        clip: &str,
        params: &FadeRequestParams,
    ) -> Result<InstanceId, RequestError> {
        let target = find_layer_mut(&mut self.layers, layer)?
            .as_simple_mut()
            .ok_or_else(|| LayerError::NotSimple(layer.into()))?;
        let id = target.request_fade_to_anim(&self.clips, clip, params)?;
        Ok(id)
    }

    /// Queue a direct fade to `state` on a state layer.
    pub fn fade_to_state(
        &mut self,
        layer: &str,
        state: &str,
        params: &FadeToStateParams,
    ) -> Result<RequestId, RequestError> {
        let target = find_layer_mut(&mut self.layers, layer)?
            .as_state_mut()
            .ok_or_else(|| LayerError::NotState(layer.into()))?;
        let id = target.fade_to_state(&self.clips, state, params)?;
        Ok(id)
    }

    /// Queue taking `transition` from the current state of a state layer.
    pub fn request_transition(
        &mut self,
        layer: &str,
        transition: &str,
        params: &FadeToStateParams,
    ) -> Result<RequestId, LayerError> {
        Ok(self
            .state_layer_mut(layer)?
            .request_transition(transition, params))
    }

    /// Advance all layers by `delta_time` seconds, pose the skeleton and move the object.
    #[tracing::instrument(skip_all)]
    pub fn step(&mut self, delta_time: f32) {
        self.begin_step(delta_time);
        self.finish_step();
    }

    /// Take transitions and advance phases and fades of all layers.
    ///
    /// Phase dependent decisions can be made between this and [AnimControl::finish_step].
    pub fn begin_step(&mut self, delta_time: f32) {
        self.frame += 1;
        for layer in &mut self.layers {
            layer.begin_step(delta_time, self.frame, &self.clips);
        }
    }

    /// Write the blended layer poses and resolve the new object align.
    pub fn finish_step(&mut self) {
        // Gameplay inputs survive resetting the pose.
        let inputs: Vec<_> = (0..self.cache.skeleton().input_controls.len())
            .filter_map(|i| self.cache.input_control(i))
            .collect();
        self.cache.reset_to_bind_pose();
        for (i, value) in inputs.into_iter().enumerate() {
            self.cache.set_input_control(i, value);
        }

        for layer in &self.layers {
            layer.finish_step(&mut self.cache);
        }

        let align = self.resolve_align();
        if align.is_finite() {
            self.align = align;
        } else {
            log::error!("Ignoring non finite align {align:?}");
            debug_assert!(align.is_finite());
        }
        self.cache.set_object_transform(self.align);
    }

    #[tracing::instrument(skip_all)]
    fn resolve_align(&mut self) -> Locator {
        let Some(layer) = self
            .layers
            .iter_mut()
            .rev()
            .find(|l| l.config().drives_align && l.instance_count() > 0)
        else {
            return self.align;
        };

        match layer {
            AnimLayer::State(layer) => {
                self.instance_aligns.clear();
                let align = AnimAlignBlender::new(self.align, self.scale)
                    .with_interp(self.align_interp)
                    .blend_forward(layer, Some(&mut self.instance_aligns));
                layer.save_top_aligns(&self.instance_aligns);
                align
            }
            AnimLayer::Simple(layer) => {
                let mut delta = layer.anim_align_delta(&self.align);
                delta.translation *= self.scale;
                self.align.transform(&delta).normalized()
            }
        }
    }

    /// The locator channel `name` from the highest priority layer providing it.
    pub fn evaluate_channel(&self, name: &str) -> Option<Locator> {
        self.layers
            .iter()
            .rev()
            .find_map(|l| l.evaluate_channel(name))
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.layers.iter().map(|l| l.name())
    }
}

fn find_layer_mut<'a>(
    layers: &'a mut [AnimLayer],
    name: &str,
) -> Result<&'a mut AnimLayer, LayerError> {
    layers
        .iter_mut()
        .find(|l| l.name() == name)
        .ok_or_else(|| {
            warn!("Failed to find layer {name:?}");
            LayerError::MissingLayer(name.into())
        })
}

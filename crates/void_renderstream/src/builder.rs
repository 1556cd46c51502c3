//! Build-time schema assembly
//!
//! Collects each processed scene's camera names and exposed parameters into
//! the schema saved next to the built application.

use crate::config::SceneControl;
use crate::fields::TargetRegistry;
use crate::schema::{SceneParameters, Schema};

/// Name of the single scene of a manual schema
pub const DEFAULT_SCENE: &str = "Default";

/// Accumulates a schema scene by scene
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    control: SceneControl,
    /// Scenes declared for the build
    scene_count: usize,
    schema: Schema,
}

impl SchemaBuilder {
    /// Start a schema for `scene_count` build scenes
    pub fn new(control: SceneControl, scene_count: usize) -> Self {
        let scenes = match control {
            SceneControl::Selection => {
                log::info!("Generating scene-selection schema for {} scenes", scene_count);
                if scene_count == 0 {
                    log::warn!("No scenes declared, schema will be empty");
                }
                (0..scene_count).map(|_| SceneParameters::new("")).collect()
            }
            SceneControl::Manual => {
                log::info!("Generating manual schema");
                vec![SceneParameters::new(DEFAULT_SCENE)]
            }
        };

        Self {
            control,
            scene_count,
            schema: Schema {
                channels: Vec::new(),
                scenes,
            },
        }
    }

    pub fn control(&self) -> SceneControl {
        self.control
    }

    /// Record one processed scene: its template cameras and exposed targets
    pub fn add_scene<S: AsRef<str>>(
        &mut self,
        index: u32,
        name: &str,
        cameras: &[S],
        targets: &TargetRegistry,
    ) -> &mut Self {
        match self.control {
            SceneControl::Selection => {
                let slot = index as usize;
                if slot >= self.scene_count {
                    log::info!("Ignoring scene: {} (not in the build's scene list)", name);
                    return self;
                }
                log::info!("Processing scene: {} ({}/{})", name, index, self.scene_count);
                self.add_channels(cameras);

                let scene = &mut self.schema.scenes[slot];
                scene.name = name.to_string();
                scene.parameters = targets.describe_all();
            }
            SceneControl::Manual => {
                log::info!("Processing scene: {}", name);
                self.add_channels(cameras);

                if let Some(scene) = self.schema.scenes.first_mut() {
                    scene.parameters.extend(targets.describe_all());
                }
            }
        }
        self
    }

    fn add_channels<S: AsRef<str>>(&mut self, cameras: &[S]) {
        for camera in cameras {
            self.schema.add_channel(camera.as_ref());
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::ExposedParameters;
    use crate::schema::ParameterType;
    use glam::Vec3;

    fn light_targets() -> TargetRegistry {
        let mut light = ExposedParameters::new("light").with_group("Light");
        light
            .float("intensity", "Intensity", 0.0, 10.0, 1.0, |_| {})
            .vec3("pos", "Position", Vec3::ZERO, |_| {});
        let mut targets = TargetRegistry::new();
        targets.register(light);
        targets
    }

    fn screen_targets() -> TargetRegistry {
        let mut screen = ExposedParameters::new("screen");
        screen.text("caption", "Caption", "", |_| {});
        let mut targets = TargetRegistry::new();
        targets.register(screen);
        targets
    }

    #[test]
    fn test_manual_accumulates_into_default() {
        let mut builder = SchemaBuilder::new(SceneControl::Manual, 2);
        builder
            .add_scene(0, "Stage", &["Main", "Side"], &light_targets())
            .add_scene(1, "Backstage", &["Main"], &screen_targets());
        let schema = builder.build();

        assert_eq!(schema.scenes.len(), 1);
        assert_eq!(schema.scenes[0].name, DEFAULT_SCENE);
        let keys: Vec<_> = schema.scenes[0].parameters.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["light_intensity", "light_pos_x", "light_pos_y", "light_pos_z", "screen_caption"]
        );
        assert_eq!(schema.channels, vec!["Main".to_string(), "Side".into()]);
    }

    #[test]
    fn test_selection_one_scene_per_index() {
        let mut builder = SchemaBuilder::new(SceneControl::Selection, 2);
        builder
            .add_scene(1, "Backstage", &["Rear"], &screen_targets())
            .add_scene(0, "Stage", &["Main"], &light_targets());
        let schema = builder.build();

        assert_eq!(schema.scenes.len(), 2);
        assert_eq!(schema.scenes[0].name, "Stage");
        assert_eq!(schema.scenes[0].parameters.len(), 4);
        assert_eq!(schema.scenes[1].name, "Backstage");
        assert_eq!(schema.scenes[1].parameters[0].kind, ParameterType::Text);
    }

    #[test]
    fn test_selection_ignores_undeclared_scene() {
        let mut builder = SchemaBuilder::new(SceneControl::Selection, 1);
        builder.add_scene(3, "Extra", &["Extra"], &light_targets());
        let schema = builder.schema();

        assert_eq!(schema.scenes.len(), 1);
        assert!(schema.scenes[0].parameters.is_empty());
        assert!(schema.channels.is_empty());
    }

    #[test]
    fn test_selection_without_scenes_is_empty() {
        let schema = SchemaBuilder::new(SceneControl::Selection, 0).build();
        assert!(schema.scenes.is_empty());
    }
}

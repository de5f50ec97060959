//! Overlay layer groups, the session's [`MapState`] and the layer control panel.

use bevy::prelude::*;

use crate::{tile_fetcher::TileFetchConfig, tiles::ActiveBaseLayer};

pub(crate) fn layers_plugin(app: &mut App) {
    app.add_systems(PreStartup, spawn_layer_groups)
        .add_systems(Startup, (spawn_layer_control, spawn_attribution))
        .add_systems(
            Update,
            (
                keyboard_layer_control,
                click_layer_control,
                refresh_layer_control,
                refresh_attribution,
            )
                .chain(),
        );
}

/// The togglable overlays of the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Overlay {
    Earthquakes,
    TectonicPlates,
}

impl Overlay {
    pub const ALL: [Overlay; 2] = [Overlay::Earthquakes, Overlay::TectonicPlates];

    pub fn label(&self) -> &'static str {
        match self {
            Overlay::Earthquakes => "Earthquakes",
            Overlay::TectonicPlates => "Tectonic Plates",
        }
    }
}

/// Container entity for the markers or shapes of one overlay; its children inherit its visibility.
#[derive(Component, Debug, Clone, Copy)]
#[require(Transform, Visibility = Visibility::Hidden)]
pub struct LayerGroup(pub Overlay);

/// Map objects owned by the session. Created once, before any layer content arrives.
#[derive(Resource, Debug, Clone, Copy)]
pub struct MapState {
    pub earthquakes: Entity,
    pub tectonic_plates: Entity,
}

impl MapState {
    pub fn layer(&self, overlay: Overlay) -> Entity {
        match overlay {
            Overlay::Earthquakes => self.earthquakes,
            Overlay::TectonicPlates => self.tectonic_plates,
        }
    }

    /// Spawns both (hidden) layer groups into `world`.
    pub fn spawn(world: &mut World) -> Self {
        Self {
            earthquakes: world
                .spawn((Name::new("Earthquakes"), LayerGroup(Overlay::Earthquakes)))
                .id(),
            tectonic_plates: world
                .spawn((
                    Name::new("Tectonic Plates"),
                    LayerGroup(Overlay::TectonicPlates),
                ))
                .id(),
        }
    }
}

fn spawn_layer_groups(world: &mut World) {
    let state = MapState::spawn(world);
    world.insert_resource(state);
}

/// Sets an overlay's visibility, the equivalent of adding it to or removing it from the map.
pub fn set_overlay_visible(
    state: &MapState,
    overlay: Overlay,
    visible: bool,
    layers: &mut Query<&mut Visibility, With<LayerGroup>>,
) {
    if let Ok(mut visibility) = layers.get_mut(state.layer(overlay)) {
        *visibility = if visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
    }
}

fn toggle_overlay(
    state: &MapState,
    overlay: Overlay,
    layers: &mut Query<&mut Visibility, With<LayerGroup>>,
) {
    let shown = layers
        .get(state.layer(overlay))
        .is_ok_and(|v| *v != Visibility::Hidden);
    debug!("toggling {} -> {}", overlay.label(), !shown);
    set_overlay_visible(state, overlay, !shown, layers);
}

/// Entry of the layer control panel.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerToggle {
    Base(usize),
    Overlay(Overlay),
}

#[derive(Component, Debug)]
struct LayerControlPanel;

#[derive(Component, Debug)]
struct AttributionText;

const PANEL_BACKGROUND: Color = Color::srgba(1.0, 1.0, 1.0, 0.85);
const LABEL_COLOR: Color = Color::srgb(0.2, 0.2, 0.2);

fn control_label(toggle: LayerToggle, checked: bool, config: &TileFetchConfig) -> String {
    match toggle {
        LayerToggle::Base(index) => {
            let name = config
                .sources
                .get(index)
                .map(|s| s.name.as_str())
                .unwrap_or("?");
            format!("({}) {name}", if checked { "*" } else { " " })
        }
        LayerToggle::Overlay(overlay) => {
            format!("[{}] {}", if checked { "x" } else { " " }, overlay.label())
        }
    }
}

fn spawn_layer_control(mut commands: Commands, config: Res<TileFetchConfig>) {
    let mut toggles: Vec<LayerToggle> = (0..config.sources.len()).map(LayerToggle::Base).collect();
    toggles.extend(Overlay::ALL.map(LayerToggle::Overlay));

    commands
        .spawn((
            LayerControlPanel,
            Node {
                position_type: PositionType::Absolute,
                right: Val::Px(10.0),
                top: Val::Px(10.0),
                flex_direction: FlexDirection::Column,
                padding: UiRect::all(Val::Px(6.0)),
                row_gap: Val::Px(2.0),
                ..default()
            },
            BackgroundColor(PANEL_BACKGROUND),
        ))
        .with_children(|panel| {
            for toggle in toggles {
                panel.spawn((
                    Button,
                    toggle,
                    Text::new(control_label(toggle, false, &config)),
                    TextFont {
                        font_size: 13.0,
                        ..default()
                    },
                    TextColor(LABEL_COLOR),
                ));
            }
        });
}

fn keyboard_layer_control(
    keys: Res<ButtonInput<KeyCode>>,
    state: Res<MapState>,
    config: Res<TileFetchConfig>,
    mut active: ResMut<ActiveBaseLayer>,
    mut layers: Query<&mut Visibility, With<LayerGroup>>,
) {
    let digits = [
        KeyCode::Digit1,
        KeyCode::Digit2,
        KeyCode::Digit3,
        KeyCode::Digit4,
    ];
    for (index, key) in digits.iter().enumerate() {
        if keys.just_pressed(*key) && index < config.sources.len() && active.0 != index {
            active.0 = index;
        }
    }
    if keys.just_pressed(KeyCode::KeyE) {
        toggle_overlay(&state, Overlay::Earthquakes, &mut layers);
    }
    if keys.just_pressed(KeyCode::KeyT) {
        toggle_overlay(&state, Overlay::TectonicPlates, &mut layers);
    }
}

fn click_layer_control(
    buttons: Query<(&Interaction, &LayerToggle), Changed<Interaction>>,
    state: Res<MapState>,
    mut active: ResMut<ActiveBaseLayer>,
    mut layers: Query<&mut Visibility, With<LayerGroup>>,
) {
    for (interaction, toggle) in buttons.iter() {
        if *interaction != Interaction::Pressed {
            continue;
        }
        match *toggle {
            LayerToggle::Base(index) if active.0 != index => active.0 = index,
            LayerToggle::Base(_) => {}
            LayerToggle::Overlay(overlay) => toggle_overlay(&state, overlay, &mut layers),
        }
    }
}

fn refresh_layer_control(
    active: Res<ActiveBaseLayer>,
    config: Res<TileFetchConfig>,
    state: Res<MapState>,
    layers: Query<Ref<Visibility>, With<LayerGroup>>,
    mut entries: Query<(&LayerToggle, &mut Text)>,
) {
    let overlays_changed = layers.iter().any(|v| v.is_changed());
    if !active.is_changed() && !overlays_changed {
        return;
    }
    for (toggle, mut text) in entries.iter_mut() {
        let checked = match *toggle {
            LayerToggle::Base(index) => active.0 == index,
            LayerToggle::Overlay(overlay) => layers
                .get(state.layer(overlay))
                .is_ok_and(|v| *v != Visibility::Hidden),
        };
        text.0 = control_label(*toggle, checked, &config);
    }
}

fn spawn_attribution(mut commands: Commands) {
    commands.spawn((
        AttributionText,
        Text::new(""),
        TextFont {
            font_size: 11.0,
            ..default()
        },
        TextColor(LABEL_COLOR),
        BackgroundColor(PANEL_BACKGROUND),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(4.0),
            bottom: Val::Px(2.0),
            padding: UiRect::horizontal(Val::Px(4.0)),
            ..default()
        },
    ));
}

fn refresh_attribution(
    active: Res<ActiveBaseLayer>,
    config: Res<TileFetchConfig>,
    mut text: Query<&mut Text, With<AttributionText>>,
) {
    if !active.is_changed() {
        return;
    }
    let attribution = config
        .sources
        .get(active.0)
        .map(|s| s.attribution.clone())
        .unwrap_or_default();
    for mut text in text.iter_mut() {
        text.0 = attribution.clone();
    }
}

#[cfg(test)]
mod tests {
    use bevy::ecs::system::RunSystemOnce;

    use super::*;

    fn control_world() -> (World, MapState) {
        let mut world = World::new();
        let state = MapState::spawn(&mut world);
        world.insert_resource(state);
        world.insert_resource(TileFetchConfig::default());
        world.init_resource::<ActiveBaseLayer>();
        world.init_resource::<ButtonInput<KeyCode>>();
        (world, state)
    }

    fn visibility(world: &World, entity: Entity) -> Visibility {
        world.get::<Visibility>(entity).copied().unwrap_or_default()
    }

    fn press(world: &mut World, key: KeyCode) {
        let mut keys = world.resource_mut::<ButtonInput<KeyCode>>();
        keys.reset_all();
        keys.press(key);
        world.run_system_once(keyboard_layer_control).unwrap();
    }

    #[test]
    fn layer_groups_start_hidden() {
        let mut world = World::new();
        let state = MapState::spawn(&mut world);
        assert_ne!(state.earthquakes, state.tectonic_plates);
        for overlay in Overlay::ALL {
            let entity = world.entity(state.layer(overlay));
            assert_eq!(entity.get::<LayerGroup>().map(|g| g.0), Some(overlay));
            assert_eq!(entity.get::<Visibility>(), Some(&Visibility::Hidden));
        }
    }

    #[test]
    fn labels_show_state() {
        let config = TileFetchConfig::default();
        assert_eq!(
            control_label(LayerToggle::Base(0), true, &config),
            "(*) Basemap"
        );
        assert_eq!(
            control_label(LayerToggle::Base(1), false, &config),
            "( ) Street"
        );
        assert_eq!(
            control_label(LayerToggle::Overlay(Overlay::TectonicPlates), true, &config),
            "[x] Tectonic Plates"
        );
    }

    #[test]
    fn overlays_toggle_independently() {
        let (mut world, state) = control_world();

        press(&mut world, KeyCode::KeyE);
        assert_eq!(visibility(&world, state.earthquakes), Visibility::Inherited);
        assert_eq!(visibility(&world, state.tectonic_plates), Visibility::Hidden);

        press(&mut world, KeyCode::KeyT);
        assert_eq!(visibility(&world, state.earthquakes), Visibility::Inherited);
        assert_eq!(visibility(&world, state.tectonic_plates), Visibility::Inherited);

        press(&mut world, KeyCode::KeyE);
        assert_eq!(visibility(&world, state.earthquakes), Visibility::Hidden);
        assert_eq!(visibility(&world, state.tectonic_plates), Visibility::Inherited);
    }

    #[test]
    fn digits_select_one_configured_base_layer() {
        let (mut world, _) = control_world();

        press(&mut world, KeyCode::Digit2);
        assert_eq!(world.resource::<ActiveBaseLayer>().0, 1);

        // only two sources are configured
        press(&mut world, KeyCode::Digit4);
        assert_eq!(world.resource::<ActiveBaseLayer>().0, 1);

        press(&mut world, KeyCode::Digit1);
        assert_eq!(world.resource::<ActiveBaseLayer>().0, 0);
    }

    #[test]
    fn pressed_buttons_drive_layers() {
        let (mut world, state) = control_world();
        world.spawn((Interaction::Pressed, LayerToggle::Base(1)));
        world.spawn((
            Interaction::Pressed,
            LayerToggle::Overlay(Overlay::TectonicPlates),
        ));
        world.spawn((
            Interaction::Hovered,
            LayerToggle::Overlay(Overlay::Earthquakes),
        ));
        world.run_system_once(click_layer_control).unwrap();

        assert_eq!(world.resource::<ActiveBaseLayer>().0, 1);
        assert_eq!(visibility(&world, state.tectonic_plates), Visibility::Inherited);
        assert_eq!(visibility(&world, state.earthquakes), Visibility::Hidden);
    }

    #[test]
    fn panel_labels_follow_state() {
        let (mut world, state) = control_world();
        world.spawn((LayerToggle::Base(0), Text::new("")));
        world.spawn((LayerToggle::Base(1), Text::new("")));
        world.spawn((
            LayerToggle::Overlay(Overlay::Earthquakes),
            Text::new(""),
        ));
        world
            .entity_mut(state.earthquakes)
            .insert(Visibility::Inherited);
        world.run_system_once(refresh_layer_control).unwrap();

        let mut labels: Vec<String> = world
            .query::<&Text>()
            .iter(&world)
            .map(|text| text.0.clone())
            .collect();
        labels.sort();
        assert_eq!(labels, vec!["( ) Street", "(*) Basemap", "[x] Earthquakes"]);
    }
}

use bevy::{log::LogPlugin, prelude::*};
use bevy_quake_map::{FeedStageFinished, MapPlugin, StageOutcome};

fn main() {
    App::new()
        // Configure settings with defaults
        .add_plugins(
            DefaultPlugins
                .set(LogPlugin {
                    filter:
                        "info,wgpu_core=warn,wgpu_hal=warn,naga=warn,bevy_quake_map=debug"
                            .into(),
                    level: bevy::log::Level::DEBUG,
                    ..Default::default()
                })
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "Earthquakes & Tectonic Plates".into(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
        )
        .add_plugins(MapPlugin::default())
        .add_observer(report_stage)
        .run();
}

fn report_stage(event: On<FeedStageFinished>) {
    if let StageOutcome::Failed(reason) = &event.outcome {
        warn!("{} layer left empty: {reason}", event.feed);
    }
}

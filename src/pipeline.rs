//! Two-stage feed ingestion: earthquakes first, then tectonic plates.
//!
//! Each stage is a single best-effort download on the [`IoTaskPool`]. Its outcome is recorded
//! in [`FeedPipeline`] and announced with [`FeedStageFinished`]; a failed stage leaves its
//! layer empty and hidden. The plate stage starts once the earthquake stage has finished,
//! whatever its outcome.

use std::sync::{Arc, Mutex, mpsc};

use bevy::{prelude::*, tasks::IoTaskPool};

use crate::{
    feed::{
        FeedConfig, FeedError, FeedKind, FeedSource, HttpFeedSource, PlateCollection,
        QuakeCollection, parse_earthquakes, parse_plates,
    },
    layers::{LayerGroup, MapState, Overlay, set_overlay_visible},
    markers::{markers_from_collection, spawn_markers},
    plates::spawn_plate_boundaries,
};

pub(crate) fn pipeline_plugin(app: &mut App) {
    app.init_resource::<FeedPipeline>()
        .add_systems(Startup, start_pipeline)
        .add_systems(Update, advance_pipeline);
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum StageOutcome {
    #[default]
    Pending,
    /// Number of markers or boundary lines spawned.
    Loaded { count: usize },
    Failed(String),
}

impl StageOutcome {
    pub fn is_finished(&self) -> bool {
        !matches!(self, StageOutcome::Pending)
    }
}

/// Progress of the startup feed downloads.
#[derive(Resource, Debug, Clone, Default, PartialEq)]
pub struct FeedPipeline {
    pub earthquakes: StageOutcome,
    pub tectonic_plates: StageOutcome,
}

impl FeedPipeline {
    pub fn outcome(&self, feed: FeedKind) -> &StageOutcome {
        match feed {
            FeedKind::Earthquakes => &self.earthquakes,
            FeedKind::TectonicPlates => &self.tectonic_plates,
        }
    }

    fn outcome_mut(&mut self, feed: FeedKind) -> &mut StageOutcome {
        match feed {
            FeedKind::Earthquakes => &mut self.earthquakes,
            FeedKind::TectonicPlates => &mut self.tectonic_plates,
        }
    }

    pub fn is_done(&self) -> bool {
        self.earthquakes.is_finished() && self.tectonic_plates.is_finished()
    }
}

/// Triggered once per stage when its download has been rendered or has failed.
#[derive(Event, Debug, Clone)]
pub struct FeedStageFinished {
    pub feed: FeedKind,
    pub outcome: StageOutcome,
}

enum FeedPayload {
    Earthquakes(QuakeCollection),
    TectonicPlates(PlateCollection),
}

type LoadResult = (FeedKind, Result<FeedPayload, FeedError>);

/// Runs feed downloads off the main thread and hands the decoded documents back.
#[derive(Resource)]
pub struct FeedLoader {
    source: Arc<dyn FeedSource>,
    config: FeedConfig,
    sender: mpsc::Sender<LoadResult>,
    receiver: Arc<Mutex<mpsc::Receiver<LoadResult>>>,
}

impl FeedLoader {
    pub fn new(source: Arc<dyn FeedSource>, config: FeedConfig) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            source,
            config,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    fn request(&self, feed: FeedKind) {
        let url = self.config.url(feed).to_string();
        let source = Arc::clone(&self.source);
        let sender = self.sender.clone();
        info!("fetching {feed} feed from {url}");

        IoTaskPool::get()
            .spawn(async move {
                let result = source.fetch(&url).and_then(|bytes| match feed {
                    FeedKind::Earthquakes => parse_earthquakes(&bytes).map(FeedPayload::Earthquakes),
                    FeedKind::TectonicPlates => {
                        parse_plates(&bytes).map(FeedPayload::TectonicPlates)
                    }
                });
                let _ = sender.send((feed, result));
            })
            .detach();
    }

    fn drain_ready(&self) -> Vec<LoadResult> {
        let mut ready = Vec::new();
        loop {
            let message = match self.receiver.lock() {
                Ok(receiver) => receiver.try_recv(),
                Err(_) => break,
            };
            match message {
                Ok(result) => ready.push(result),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => break,
            }
        }
        ready
    }
}

fn start_pipeline(
    mut commands: Commands,
    config: Res<FeedConfig>,
    loader: Option<Res<FeedLoader>>,
    mut pipeline: ResMut<FeedPipeline>,
) {
    if let Some(loader) = loader {
        loader.request(FeedKind::Earthquakes);
        return;
    }
    match HttpFeedSource::new(&config.headers) {
        Ok(source) => {
            let loader = FeedLoader::new(Arc::new(source), config.clone());
            loader.request(FeedKind::Earthquakes);
            commands.insert_resource(loader);
        }
        Err(err) => {
            error!("feed client unavailable: {err}");
            for feed in [FeedKind::Earthquakes, FeedKind::TectonicPlates] {
                finish_stage(
                    &mut commands,
                    &mut pipeline,
                    feed,
                    StageOutcome::Failed(err.to_string()),
                );
            }
        }
    }
}

fn finish_stage(
    commands: &mut Commands,
    pipeline: &mut FeedPipeline,
    feed: FeedKind,
    outcome: StageOutcome,
) {
    match &outcome {
        StageOutcome::Loaded { count } => info!("{feed} layer ready with {count} items"),
        StageOutcome::Failed(reason) => error!("{feed} feed failed: {reason}"),
        StageOutcome::Pending => {}
    }
    *pipeline.outcome_mut(feed) = outcome.clone();
    commands.trigger(FeedStageFinished { feed, outcome });
}

fn advance_pipeline(
    mut commands: Commands,
    loader: Option<Res<FeedLoader>>,
    state: Res<MapState>,
    mut pipeline: ResMut<FeedPipeline>,
    mut layers: Query<&mut Visibility, With<LayerGroup>>,
) {
    let Some(loader) = loader else {
        return;
    };
    for (feed, result) in loader.drain_ready() {
        let outcome = match result {
            Ok(FeedPayload::Earthquakes(collection)) => {
                let markers = markers_from_collection(&collection);
                debug!(
                    "{} of {} earthquake features have a position",
                    markers.len(),
                    collection.features.len()
                );
                let count = spawn_markers(&mut commands, state.earthquakes, markers);
                set_overlay_visible(&state, Overlay::Earthquakes, true, &mut layers);
                StageOutcome::Loaded { count }
            }
            Ok(FeedPayload::TectonicPlates(plates)) => {
                let count = spawn_plate_boundaries(&mut commands, state.tectonic_plates, &plates);
                set_overlay_visible(&state, Overlay::TectonicPlates, true, &mut layers);
                StageOutcome::Loaded { count }
            }
            Err(err) => StageOutcome::Failed(err.to_string()),
        };
        finish_stage(&mut commands, &mut pipeline, feed, outcome);

        if feed == FeedKind::Earthquakes {
            loader.request(FeedKind::TectonicPlates);
        }
    }
}

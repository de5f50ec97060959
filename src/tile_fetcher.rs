use std::{
    collections::HashMap,
    sync::{Arc, Mutex, mpsc},
};

use bevy::{
    asset::RenderAssetUsages,
    prelude::*,
    render::render_resource::{Extent3d, TextureDimension, TextureFormat},
    tasks::IoTaskPool,
};
use image::{GenericImageView, ImageError};
use reqwest::{
    StatusCode,
    blocking::Client,
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use thiserror::Error;
use tilemath::Tile as TileMathTile;

use crate::tiles::Tile;

const OSM_URL_TEMPLATE: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
const OSM_ATTRIBUTION: &str = "\u{a9} OpenStreetMap contributors";

/// A raster base layer.
#[derive(Clone, Debug, PartialEq)]
pub struct TileSource {
    /// Name shown in the layer control.
    pub name: String,
    /// Template URL that contains `{z}`, `{x}`, `{y}` and optionally `{s}` placeholders.
    pub url_template: String,
    /// Values rotated into `{s}`.
    pub subdomains: Vec<String>,
    pub attribution: String,
}

impl TileSource {
    /// OpenStreetMap standard tiles under the given layer name.
    pub fn openstreetmap(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: OSM_URL_TEMPLATE.to_string(),
            subdomains: ["a", "b", "c"].map(String::from).to_vec(),
            attribution: OSM_ATTRIBUTION.to_string(),
        }
    }

    /// Fills the template for an XYZ tile (origin top-left).
    pub fn format_url(&self, tile: &TileMathTile) -> String {
        let mut url = self
            .url_template
            .replace("{z}", &tile.zoom.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string());
        if !self.subdomains.is_empty() {
            let index = (tile.x as usize + tile.y as usize) % self.subdomains.len();
            url = url.replace("{s}", &self.subdomains[index]);
        }
        url
    }
}

/// Configuration for downloading map tiles.
#[derive(Resource, Clone, Debug)]
pub struct TileFetchConfig {
    /// Selectable base layers; the first one is active at startup.
    pub sources: Vec<TileSource>,
    /// Optional HTTP headers sent with every tile request.
    pub headers: HashMap<String, String>,
    /// Whether to use TMS-style Y coordinates (origin bottom-left) instead of XYZ-style (origin top-left).
    pub reverse_y: bool,
    /// zoom level offset applied when fetching tiles (can be negative).
    /// For example, with an offset of -1, tile 3/4/2 will be fetched when tile 4/4/2 is requested.
    pub zoom_offset: i8,
    /// Highest zoom level the tile server provides.
    pub max_zoom: u8,
}

impl Default for TileFetchConfig {
    fn default() -> Self {
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), "bevy-quake-map/0.1".to_string());
        Self {
            sources: vec![
                TileSource::openstreetmap("Basemap"),
                TileSource::openstreetmap("Street"),
            ],
            headers,
            reverse_y: false,
            zoom_offset: 0,
            max_zoom: 19,
        }
    }
}

/// Error type for tile fetching operations.
#[derive(Debug, Error)]
pub enum TileFetchError {
    #[error("HTTP request failed with status {0}")]
    HttpStatus(StatusCode),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unknown tile source {0}")]
    UnknownSource(usize),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl From<reqwest::Error> for TileFetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<ImageError> for TileFetchError {
    fn from(err: ImageError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// A tile of one particular base layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TileKey {
    source: usize,
    tile: TileMathTile,
}

struct TileImagePayload {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

type FetchResult = (TileKey, Result<TileImagePayload, TileFetchError>);

#[derive(Resource)]
pub struct TileFetcher {
    client: Arc<Client>,
    sources: Arc<Vec<TileSource>>,
    sender: mpsc::Sender<FetchResult>,
    receiver: Arc<Mutex<mpsc::Receiver<FetchResult>>>,
    waiting: HashMap<TileKey, Vec<Entity>>,
}

impl TileFetcher {
    pub fn new(config: &TileFetchConfig) -> Result<Self, TileFetchError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| TileFetchError::InvalidHeader(format!("{name}: {err}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|err| TileFetchError::InvalidHeader(format!("{name}: {err}")))?;
            default_headers.insert(header_name, header_value);
        }

        let client = Client::builder().default_headers(default_headers).build()?;

        let (sender, receiver) = mpsc::channel();

        Ok(Self {
            client: Arc::new(client),
            sources: Arc::new(config.sources.clone()),
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            waiting: HashMap::new(),
        })
    }

    /// Queues a download for `tile` (XYZ order) of base layer `source`; `entity` receives the sprite.
    pub fn request_tile(&mut self, entity: Entity, source: usize, tile: TileMathTile) {
        let key = TileKey { source, tile };
        let entry = self.waiting.entry(key).or_default();
        if !entry.contains(&entity) {
            entry.push(entity);
        }

        if entry.len() > 1 {
            return;
        }

        let client = Arc::clone(&self.client);
        let sender = self.sender.clone();
        let sources = Arc::clone(&self.sources);

        IoTaskPool::get()
            .spawn(async move {
                let result = match sources.get(key.source) {
                    Some(source) => fetch_tile(&client, source, &key.tile),
                    None => Err(TileFetchError::UnknownSource(key.source)),
                };
                let _ = sender.send((key, result));
            })
            .detach();
    }

    /// Forgets every pending request; results arriving later are dropped.
    pub fn cancel_all(&mut self) {
        self.waiting.clear();
    }

    fn drain_ready(
        &mut self,
    ) -> Vec<(
        Vec<Entity>,
        TileKey,
        Result<TileImagePayload, TileFetchError>,
    )> {
        let mut responses = Vec::new();
        loop {
            let message = match self.receiver.lock() {
                Ok(receiver) => receiver.try_recv(),
                Err(_) => break,
            };

            match message {
                Ok((key, result)) => {
                    if let Some(listeners) = self.waiting.remove(&key) {
                        responses.push((listeners, key, result));
                    }
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => break,
            }
        }
        responses
    }
}

fn fetch_tile(
    client: &Client,
    source: &TileSource,
    tile: &TileMathTile,
) -> Result<TileImagePayload, TileFetchError> {
    let response = client.get(source.format_url(tile)).send()?;
    if !response.status().is_success() {
        return Err(TileFetchError::HttpStatus(response.status()));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string());
    let bytes = response.bytes()?.to_vec();

    Ok(TileImagePayload {
        bytes,
        content_type,
    })
}

#[derive(Component, Debug, Default)]
pub struct TileTextureLoading;

#[derive(Component, Debug)]
pub struct TileTextureError {
    pub message: Arc<str>,
}

impl TileTextureError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        let boxed: Box<str> = message.into().into_boxed_str();
        Self {
            message: Arc::<str>::from(boxed),
        }
    }
}

/// Converts a map tile (bottom-origin y) into the coordinates the server expects.
pub(crate) fn server_tile(tile: TileMathTile, config: &TileFetchConfig) -> TileMathTile {
    let y = if config.reverse_y {
        tile.y
    } else {
        (1 << tile.zoom) - 1 - tile.y
    };
    // some tile servers label their zoom levels differently
    let zoom = (tile.zoom as i8 + config.zoom_offset).max(0) as u8;
    TileMathTile {
        zoom,
        x: tile.x,
        y,
    }
}

pub(crate) fn queue_tile_downloads(
    mut commands: Commands,
    fetcher: Option<ResMut<TileFetcher>>,
    config: Res<TileFetchConfig>,
    tiles: Query<(Entity, &Tile), Added<Tile>>,
) {
    let Some(mut fetcher) = fetcher else {
        return;
    };
    for (entity, tile) in tiles.iter() {
        fetcher.request_tile(entity, tile.source, server_tile(tile.coords, &config));
        commands
            .entity(entity)
            .remove::<TileTextureError>()
            .insert(TileTextureLoading);
    }
}

pub(crate) fn apply_tile_fetch_results(
    mut commands: Commands,
    fetcher: Option<ResMut<TileFetcher>>,
    mut images: ResMut<Assets<Image>>,
) {
    let Some(mut fetcher) = fetcher else {
        return;
    };
    for (entities, key, result) in fetcher.drain_ready() {
        let tile = key.tile;
        match result.and_then(|payload| {
            if let Some(content_type) = &payload.content_type {
                trace!("tile {:?} reported content-type {}", tile, content_type);
            }
            build_image_from_payload(&payload)
        }) {
            Ok(image) => {
                let handle = images.add(image);
                for entity in &entities {
                    if let Ok(mut entity_commands) = commands.get_entity(*entity) {
                        entity_commands
                            .remove::<(TileTextureLoading, TileTextureError)>()
                            .insert(Sprite {
                                image: handle.clone(),
                                custom_size: Some(Vec2::ONE),
                                ..Default::default()
                            });
                    }
                }
            }
            Err(err) => {
                error!("failed to load tile {:?}: {}", tile, err);
                for entity in entities {
                    if let Ok(mut entity_commands) = commands.get_entity(entity) {
                        entity_commands.remove::<TileTextureLoading>();
                        entity_commands.insert(TileTextureError::new(err.to_string()));
                    }
                }
            }
        }
    }
}

fn build_image_from_payload(payload: &TileImagePayload) -> Result<Image, TileFetchError> {
    let dynamic = image::load_from_memory(&payload.bytes)?;
    let rgba = dynamic.to_rgba8();
    let (width, height) = dynamic.dimensions();
    Ok(Image::new_fill(
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        &rgba,
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osm_template_with_subdomains() {
        let source = TileSource::openstreetmap("Street");
        let url = source.format_url(&TileMathTile { zoom: 3, x: 2, y: 5 });
        assert_eq!(url, "https://b.tile.openstreetmap.org/3/2/5.png");
        let url = source.format_url(&TileMathTile { zoom: 3, x: 0, y: 0 });
        assert_eq!(url, "https://a.tile.openstreetmap.org/3/0/0.png");
    }

    #[test]
    fn flips_y_for_xyz_servers() {
        let config = TileFetchConfig::default();
        let tile = TileMathTile { zoom: 3, x: 1, y: 0 };
        assert_eq!(server_tile(tile, &config), TileMathTile { zoom: 3, x: 1, y: 7 });

        let tms = TileFetchConfig {
            reverse_y: true,
            zoom_offset: -1,
            ..Default::default()
        };
        assert_eq!(server_tile(tile, &tms), TileMathTile { zoom: 2, x: 1, y: 0 });
    }

    #[test]
    fn decodes_png_payload() {
        let mut bytes = Vec::new();
        image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]))
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let payload = TileImagePayload {
            bytes,
            content_type: Some("image/png".to_string()),
        };
        let image = build_image_from_payload(&payload).unwrap();
        assert_eq!(image.width(), 4);
        assert_eq!(image.height(), 2);

        let garbage = TileImagePayload {
            bytes: b"not an image".to_vec(),
            content_type: None,
        };
        assert!(matches!(
            build_image_from_payload(&garbage),
            Err(TileFetchError::Decode(_))
        ));
    }

    #[test]
    fn bad_header_is_a_config_error() {
        let mut config = TileFetchConfig::default();
        config
            .headers
            .insert("Referer".to_string(), "bad\u{7f}value".to_string());
        assert!(matches!(
            TileFetcher::new(&config),
            Err(TileFetchError::InvalidHeader(_))
        ));
    }
}

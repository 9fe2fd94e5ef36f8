//! Accent color sampling.
//!
//! Downloads a post's image, builds a small palette from it and picks a
//! "vibrant" swatch, then a "muted" one. Sampling is best effort: every
//! failure collapses to `None` and the caller falls back to
//! [`DEFAULT_ACCENT_COLOR`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use reqwest::Client;

/// Embed color used when no swatch can be derived.
pub const DEFAULT_ACCENT_COLOR: u32 = 0x0099FF;

const IMAGE_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_DIMENSION: u32 = 100;
const MAX_SWATCHES: usize = 64;
const MIN_ALPHA: u8 = 125;

#[async_trait]
pub trait ColorSampler {
    /// Accent color for the image at `image_url`, if one can be derived.
    async fn sample(&self, image_url: &str) -> Option<u32>;
}

/// Samples colors by fetching and decoding the image in-process.
#[derive(Clone)]
pub struct ImageColorSampler {
    http: Client,
}

impl ImageColorSampler {
    pub fn new() -> Self {
        let http = Client::builder()
            .timeout(IMAGE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http }
    }
}

impl Default for ImageColorSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ColorSampler for ImageColorSampler {
    async fn sample(&self, image_url: &str) -> Option<u32> {
        if image_url.is_empty() {
            return None;
        }

        let response = match self.http.get(image_url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::debug!("Image {} returned HTTP {}", image_url, response.status());
                return None;
            }
            Err(err) => {
                tracing::debug!("Failed to fetch image {}: {}", image_url, err);
                return None;
            }
        };

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!("Failed to read image {}: {}", image_url, err);
                return None;
            }
        };

        // Decoding is CPU bound; keep it off the runtime threads.
        tokio::task::spawn_blocking(move || accent_from_bytes(&bytes))
            .await
            .ok()
            .flatten()
    }
}

/// Decode `bytes` and return the palette's accent color.
pub fn accent_from_bytes(bytes: &[u8]) -> Option<u32> {
    match image::load_from_memory(bytes) {
        Ok(img) => Palette::from_image(&img).accent(),
        Err(err) => {
            tracing::debug!("Failed to decode image: {}", err);
            None
        }
    }
}

/// A representative color and how many sampled pixels it stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swatch {
    pub rgb: [u8; 3],
    pub population: u32,
}

impl Swatch {
    /// `0xRRGGBB`.
    pub fn hex(&self) -> u32 {
        let [r, g, b] = self.rgb;
        (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
    }

    /// Saturation and lightness in `0.0..=1.0`.
    fn saturation_lightness(&self) -> (f32, f32) {
        let [r, g, b] = self.rgb.map(|c| f32::from(c) / 255.0);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let lightness = (max + min) / 2.0;

        if max == min {
            return (0.0, lightness);
        }

        let delta = max - min;
        let saturation = if lightness > 0.5 {
            delta / (2.0 - max - min)
        } else {
            delta / (max + min)
        };
        (saturation, lightness)
    }
}

struct Target {
    saturation: f32,
    min_saturation: f32,
    max_saturation: f32,
    lightness: f32,
    min_lightness: f32,
    max_lightness: f32,
}

const VIBRANT: Target = Target {
    saturation: 1.0,
    min_saturation: 0.35,
    max_saturation: 1.0,
    lightness: 0.5,
    min_lightness: 0.3,
    max_lightness: 0.7,
};

const MUTED: Target = Target {
    saturation: 0.3,
    min_saturation: 0.0,
    max_saturation: 0.4,
    lightness: 0.5,
    min_lightness: 0.3,
    max_lightness: 0.7,
};

const WEIGHT_SATURATION: f32 = 3.0;
const WEIGHT_LIGHTNESS: f32 = 6.5;
const WEIGHT_POPULATION: f32 = 0.5;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Palette {
    pub vibrant: Option<Swatch>,
    pub muted: Option<Swatch>,
}

impl Palette {
    pub fn from_image(img: &DynamicImage) -> Self {
        let swatches = quantize(img);
        let max_population = swatches.first().map(|s| s.population).unwrap_or(0);

        Self {
            vibrant: select(&swatches, &VIBRANT, max_population),
            muted: select(&swatches, &MUTED, max_population),
        }
    }

    /// Vibrant, else muted.
    pub fn accent(&self) -> Option<u32> {
        self.vibrant.or(self.muted).map(|s| s.hex())
    }
}

/// Bucket pixels at 5 bits per channel, most populated first.
fn quantize(img: &DynamicImage) -> Vec<Swatch> {
    let small = if img.width() > MAX_DIMENSION || img.height() > MAX_DIMENSION {
        img.thumbnail(MAX_DIMENSION, MAX_DIMENSION)
    } else {
        img.clone()
    };

    let mut buckets: HashMap<u16, (u32, [u64; 3])> = HashMap::new();
    for pixel in small.to_rgba8().pixels() {
        let [r, g, b, a] = pixel.0;
        if a < MIN_ALPHA || (r > 250 && g > 250 && b > 250) {
            continue;
        }
        let key = (u16::from(r >> 3) << 10) | (u16::from(g >> 3) << 5) | u16::from(b >> 3);
        let entry = buckets.entry(key).or_insert((0, [0; 3]));
        entry.0 += 1;
        entry.1[0] += u64::from(r);
        entry.1[1] += u64::from(g);
        entry.1[2] += u64::from(b);
    }

    let mut swatches: Vec<Swatch> = buckets
        .into_values()
        .map(|(count, sums)| Swatch {
            rgb: sums.map(|sum| (sum / u64::from(count)) as u8),
            population: count,
        })
        .collect();

    swatches.sort_by(|a, b| b.population.cmp(&a.population).then(a.rgb.cmp(&b.rgb)));
    swatches.truncate(MAX_SWATCHES);
    swatches
}

fn select(swatches: &[Swatch], target: &Target, max_population: u32) -> Option<Swatch> {
    swatches
        .iter()
        .filter_map(|swatch| {
            let (s, l) = swatch.saturation_lightness();
            let eligible = (target.min_saturation..=target.max_saturation).contains(&s)
                && (target.min_lightness..=target.max_lightness).contains(&l);
            if !eligible {
                return None;
            }

            let population = if max_population == 0 {
                0.0
            } else {
                swatch.population as f32 / max_population as f32
            };
            let score = WEIGHT_SATURATION * (1.0 - (s - target.saturation).abs())
                + WEIGHT_LIGHTNESS * (1.0 - (l - target.lightness).abs())
                + WEIGHT_POPULATION * population;
            Some((score, *swatch))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, swatch)| swatch)
}

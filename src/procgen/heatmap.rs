//! Population density fields that bias road growth.
//!
//! A [`Heatmap`] is an 8-bit grayscale image stretched over the generation
//! region. Image row 0 is the top (maximum y) edge of the region. Samples
//! outside the region read as zero population.

use bevy::log::debug;
use bevy::math::DVec2;
use noise::{NoiseFn, Simplex};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::error::GenerationError;
use super::quadtree::Bounds;

/// Anything road growth can sample population from.
pub trait DensityField {
    /// Population at `p`, in `[0, 1]`.
    fn population_at(&self, p: DVec2) -> f64;

    /// Mean population of a road's two endpoints.
    fn pop_on_road(&self, start: DVec2, end: DVec2) -> f64 {
        (self.population_at(start) + self.population_at(end)) / 2.0
    }
}

/// Constant density everywhere. Handy for deterministic layouts.
#[derive(Clone, Copy, Debug)]
pub struct UniformDensity(pub f64);

impl DensityField for UniformDensity {
    fn population_at(&self, _p: DVec2) -> f64 {
        self.0.clamp(0.0, 1.0)
    }
}

/// Settings for procedural heatmaps.
#[derive(Clone, Debug)]
pub struct HeatmapConfig {
    pub width: usize,
    pub height: usize,
    /// Use a ten times higher noise frequency, giving small scattered clusters.
    pub completely_random: bool,
    pub seed: u64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            completely_random: true,
            seed: 12345,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Heatmap {
    image: Vec<u8>,
    width: usize,
    height: usize,
    region: Bounds,
}

impl Heatmap {
    /// Generate a heatmap from three layered simplex samples.
    pub fn procedural(config: &HeatmapConfig, region: Bounds) -> Result<Self, GenerationError> {
        check_dimensions(config.width, config.height)?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let simplex = Simplex::new(config.seed as u32);

        let mut denominator: f64 = rng.gen_range(50.0..300.0);
        if config.completely_random {
            denominator /= 10.0;
        }
        let offset_x1: f64 = rng.gen_range(0.0..300.0);
        let offset_x2: f64 = rng.gen_range(0.0..300.0);
        let offset_y1: f64 = rng.gen_range(0.0..300.0);
        let offset_y2: f64 = rng.gen_range(0.0..300.0);

        let sample = |x: f64, y: f64| (simplex.get([x, y]).clamp(-1.0, 1.0) + 1.0) / 2.0;

        let mut image = Vec::with_capacity(config.width * config.height);
        for y in 0..config.height {
            for x in 0..config.width {
                let (x, y) = (x as f64, y as f64);
                let coarse = denominator * 2.0;
                let v1 = sample(x / denominator, y / denominator);
                let v2 = sample(x / coarse + offset_x1, y / coarse + offset_y1);
                let v3 = sample(x / coarse + offset_x2, y / coarse + offset_y2);
                let value = ((v1 * v2 + v3) / 2.0).powi(2);
                image.push((255.0 * value) as u8);
            }
        }

        debug!(
            "Procedural heatmap {}x{} (denominator {:.1})",
            config.width, config.height, denominator
        );

        Ok(Self {
            image,
            width: config.width,
            height: config.height,
            region,
        })
    }

    /// Wrap a row-major 8-bit grayscale buffer.
    pub fn from_raster(
        pixels: Vec<u8>,
        width: usize,
        height: usize,
        region: Bounds,
    ) -> Result<Self, GenerationError> {
        check_dimensions(width, height)?;
        let expected = width * height;
        if pixels.len() != expected {
            return Err(GenerationError::RasterSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            image: pixels,
            width,
            height,
            region,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.image
    }

    pub fn region(&self) -> Bounds {
        self.region
    }

    /// Stretch the image over a different world region.
    pub fn set_region(&mut self, region: Bounds) {
        self.region = region;
    }

    fn pixel_index(&self, p: DVec2) -> Option<usize> {
        let r = self.region;
        if r.width <= 0.0 || r.height <= 0.0 || !r.contains_point(p) {
            return None;
        }
        let u = (p.x - r.x) / r.width;
        let v = (r.y + r.height - p.y) / r.height;
        let col = ((u * self.width as f64) as usize).min(self.width - 1);
        let row = ((v * self.height as f64) as usize).min(self.height - 1);
        Some(row * self.width + col)
    }
}

impl DensityField for Heatmap {
    fn population_at(&self, p: DVec2) -> f64 {
        self.pixel_index(p)
            .map_or(0.0, |i| f64::from(self.image[i]) / 255.0)
    }
}

fn check_dimensions(width: usize, height: usize) -> Result<(), GenerationError> {
    if width == 0 || height == 0 {
        return Err(GenerationError::InvalidHeatmapSize { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> Bounds {
        Bounds::new(-100.0, -100.0, 200.0, 200.0)
    }

    #[test]
    fn raster_maps_top_row_to_max_y() {
        // 2x2: top-left bright, everything else dark.
        let map = Heatmap::from_raster(vec![255, 0, 0, 0], 2, 2, region()).unwrap();
        assert_eq!(map.population_at(DVec2::new(-50.0, 50.0)), 1.0);
        assert_eq!(map.population_at(DVec2::new(50.0, 50.0)), 0.0);
        assert_eq!(map.population_at(DVec2::new(-50.0, -50.0)), 0.0);
    }

    #[test]
    fn outside_region_is_empty() {
        let map = Heatmap::from_raster(vec![255; 4], 2, 2, region()).unwrap();
        assert_eq!(map.population_at(DVec2::new(500.0, 0.0)), 0.0);
        // The far edge is clamped into the last pixel.
        assert_eq!(map.population_at(DVec2::new(100.0, -100.0)), 1.0);
    }

    #[test]
    fn raster_size_is_checked() {
        let err = Heatmap::from_raster(vec![0; 3], 2, 2, region()).unwrap_err();
        assert_eq!(
            err,
            GenerationError::RasterSize {
                expected: 4,
                actual: 3
            }
        );
        assert!(matches!(
            Heatmap::from_raster(Vec::new(), 0, 2, region()),
            Err(GenerationError::InvalidHeatmapSize { .. })
        ));
    }

    #[test]
    fn road_population_averages_endpoints() {
        let map = Heatmap::from_raster(vec![255, 0, 255, 0], 2, 2, region()).unwrap();
        let pop = map.pop_on_road(DVec2::new(-50.0, 0.0), DVec2::new(50.0, 0.0));
        assert!((pop - 0.5).abs() < 1e-12);
    }

    #[test]
    fn procedural_map_is_seeded() {
        let config = HeatmapConfig {
            width: 32,
            height: 32,
            completely_random: false,
            seed: 9,
        };
        let a = Heatmap::procedural(&config, region()).unwrap();
        let b = Heatmap::procedural(&config, region()).unwrap();
        assert_eq!(a.pixels(), b.pixels());
        assert_eq!(a.pixels().len(), 32 * 32);
    }
}

//! The ray evaluation loop: parses origin/direction pairs from the input
//! stream, traces them through the scene's octree, shades hits, routes
//! contributions into modifier bins, and flushes records per the
//! accumulation counter. Zero-direction rays are flush markers, not
//! geometry.

use std::io::BufRead;

use contrib::{BinContext, ContribError, ContribRegistry, SinkTable};
use geometry::Ray;
use indicatif::ProgressBar;
use math::{Point3, Vec3};
use rayon::prelude::*;
use scene::Scene;
use shape::Shader;
use thiserror::Error;

/// Batch size for tracing when accumulation is continuous (`accumulate <= 0`)
/// and no record boundary dictates one.
const CONTINUOUS_CHUNK: usize = 512;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("unexpected EOF on ray input (got {read} of {expected} rays)")]
    UnexpectedEof { read: u64, expected: u64 },
    #[error("error reading ray input: {0}")]
    Input(#[from] std::io::Error),
    #[error(transparent)]
    Contrib(#[from] ContribError),
    #[error("cannot build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Whitespace-separated decimal floats, six per ray.
    Ascii,
    /// Little-endian f32, six per ray.
    Float,
    /// Little-endian f64, six per ray.
    Double,
}

/// Reads (origin, direction) pairs off the input stream. A short read mid-
/// pair ends the stream; whether that is an error depends on whether the
/// caller promised a ray count, so the reader just reports end-of-input.
pub struct RayReader<R> {
    input: R,
    format: InputFormat,
    pending: Vec<f32>,
}

impl<R: BufRead> RayReader<R> {
    pub fn new(input: R, format: InputFormat) -> Self {
        RayReader {
            input,
            format,
            pending: Vec::new(),
        }
    }

    pub fn read_pair(&mut self) -> Result<Option<(Point3, Vec3)>, RunError> {
        let vals = match self.format {
            InputFormat::Ascii => self.read_ascii()?,
            InputFormat::Float => self.read_binary(4, |b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))?,
            InputFormat::Double => self.read_binary(8, |b| {
                f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
            })?,
        };
        Ok(vals.map(|v| {
            (
                Point3::new(v[0], v[1], v[2]),
                Vec3::new(v[3], v[4], v[5]),
            )
        }))
    }

    fn read_ascii(&mut self) -> Result<Option<[f32; 6]>, RunError> {
        while self.pending.len() < 6 {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                // EOF; a partial pair counts as end-of-input here.
                return Ok(None);
            }
            for token in line.split_whitespace() {
                let value = token.parse::<f32>().map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("bad float '{}' on ray input", token),
                    )
                })?;
                self.pending.push(value);
            }
        }
        let mut vals = [0f32; 6];
        vals.copy_from_slice(&self.pending[..6]);
        self.pending.drain(..6);
        Ok(Some(vals))
    }

    fn read_binary(
        &mut self,
        width: usize,
        decode: impl Fn(&[u8]) -> f32,
    ) -> Result<Option<[f32; 6]>, RunError> {
        let mut buf = vec![0u8; width * 6];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.input.read(&mut buf[filled..])?;
            if n == 0 {
                return Ok(None);
            }
            filled += n;
        }
        let mut vals = [0f32; 6];
        for (i, chunk) in buf.chunks_exact(width).enumerate() {
            vals[i] = decode(chunk);
        }
        Ok(Some(vals))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoopOptions {
    /// Rays per output record. `1` flushes after every ray; `<= 0` means
    /// continuous accumulation with exactly one flush at end-of-run.
    pub accumulate: i64,
    /// Expected number of rays; falling short of it is a fatal stream error.
    pub ray_count: Option<u64>,
    /// Worker threads tracing each batch.
    pub processes: usize,
    /// Treat each ray as an immediate irradiance probe: offset the origin
    /// along the direction and trace back toward the surface.
    pub imm_irrad: bool,
    pub progress: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        LoopOptions {
            accumulate: 1,
            ray_count: None,
            processes: 1,
            imm_irrad: false,
            progress: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// Rays consumed from the input, flush markers included.
    pub rays: u64,
    /// Rays that hit a tracked modifier and produced a sample.
    pub contributions: u64,
    pub flushes: u64,
    /// Samples dropped for an out-of-range bin.
    pub dropped: u64,
    pub warnings: u64,
}

struct Sample {
    mod_idx: usize,
    bin: i64,
    color: radiometry::Color,
}

/// Drives rays from `reader` to flushed records. Rays within a batch trace
/// in parallel on the worker pool; samples are applied and flushed in input
/// order, so record k covers exactly the k-th accumulate-sized slice of the
/// input.
pub fn run<R: BufRead>(
    scene: &Scene,
    shader: &dyn Shader,
    registry: &mut ContribRegistry,
    sinks: &mut SinkTable,
    reader: &mut RayReader<R>,
    options: &LoopOptions,
) -> Result<RunStats, RunError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.processes.max(1))
        .build()?;
    let chunk = if options.accumulate > 0 {
        options.accumulate as usize
    } else {
        CONTINUOUS_CHUNK
    };
    let progress = match (options.progress, options.ray_count) {
        (true, Some(count)) => Some(ProgressBar::new(count)),
        _ => None,
    };

    let mut stats = RunStats::default();
    let mut pending: Vec<(Point3, Vec3)> = Vec::with_capacity(chunk);
    // Contributions accumulated since the last flush.
    let mut since_flush: u64 = 0;

    loop {
        if let Some(limit) = options.ray_count {
            if stats.rays >= limit {
                break;
            }
        }
        let (org, dir) = match reader.read_pair()? {
            Some(pair) => pair,
            None => break,
        };
        stats.rays += 1;
        if let Some(bar) = &progress {
            bar.inc(1);
        }

        if dir.is_zero() {
            // Flush marker: trace whatever is buffered, then force a record.
            since_flush += drain(scene, shader, registry, &pool, &mut pending, &mut stats, options)?;
            if since_flush == 0 {
                log::warn!("flush marker with nothing accumulated (empty record)");
                stats.warnings += 1;
            }
            registry.flush(sinks)?;
            stats.flushes += 1;
            since_flush = 0;
            continue;
        }

        if !dir.norm_squared().is_finite() {
            log::warn!("degenerate ray direction {} (dropped)", dir);
            stats.warnings += 1;
            continue;
        }

        pending.push((org, dir));
        if pending.len() >= chunk {
            since_flush += drain(scene, shader, registry, &pool, &mut pending, &mut stats, options)?;
            if options.accumulate > 0 {
                registry.flush(sinks)?;
                stats.flushes += 1;
                since_flush = 0;
            }
        }
    }

    since_flush += drain(scene, shader, registry, &pool, &mut pending, &mut stats, options)?;
    if options.accumulate <= 0 {
        registry.flush(sinks)?;
        stats.flushes += 1;
    } else if since_flush > 0 {
        log::warn!("partial accumulation in final record");
        stats.warnings += 1;
        registry.flush(sinks)?;
        stats.flushes += 1;
    }
    if let Some(bar) = progress {
        bar.finish();
    }
    if let Some(expected) = options.ray_count {
        if stats.rays < expected {
            return Err(RunError::UnexpectedEof {
                read: stats.rays,
                expected,
            });
        }
    }
    Ok(stats)
}

/// Traces the buffered rays and applies their samples in input order.
/// Returns how many rays were processed.
fn drain(
    scene: &Scene,
    shader: &dyn Shader,
    registry: &mut ContribRegistry,
    pool: &rayon::ThreadPool,
    pending: &mut Vec<(Point3, Vec3)>,
    stats: &mut RunStats,
    options: &LoopOptions,
) -> Result<u64, RunError> {
    if pending.is_empty() {
        return Ok(0);
    }
    let rays = std::mem::take(pending);
    let count = rays.len() as u64;
    let samples: Vec<Option<Sample>> = {
        let frozen: &ContribRegistry = registry;
        if options.processes > 1 {
            pool.install(|| {
                rays.par_iter()
                    .map(|&(org, dir)| trace_one(scene, shader, frozen, options.imm_irrad, org, dir))
                    .collect()
            })
        } else {
            rays.iter()
                .map(|&(org, dir)| trace_one(scene, shader, frozen, options.imm_irrad, org, dir))
                .collect()
        }
    };
    for sample in samples.into_iter().flatten() {
        stats.contributions += 1;
        if !registry.contribute(sample.mod_idx, sample.bin, sample.color) {
            stats.dropped += 1;
            stats.warnings += 1;
        }
    }
    Ok(count)
}

fn trace_one(
    scene: &Scene,
    shader: &dyn Shader,
    registry: &ContribRegistry,
    imm_irrad: bool,
    org: Point3,
    dir: Vec3,
) -> Option<Sample> {
    let dir = dir.try_hat()?;
    let ray = if imm_irrad {
        // Probe: step just past the surface and look back at it.
        Ray::new(org + dir * 1.1e-4, -dir)
    } else {
        Ray::new(org, dir)
    };
    let (hit, prim) = scene.nearest_hit(&ray)?;
    let mod_idx = registry.find(prim.modifier())?;
    let color = shader.shade(&ray, &hit);
    let ctx = BinContext {
        px: hit.pos.x as f64,
        py: hit.pos.y as f64,
        pz: hit.pos.z as f64,
        dx: ray.dir.x as f64,
        dy: ray.dir.y as f64,
        dz: ray.dir.z as f64,
        t: hit.t as f64,
    };
    let bin = registry.get(mod_idx).eval_bin(&ctx);
    Some(Sample {
        mod_idx,
        bin,
        color,
    })
}

//! Static tile renderer.
//!
//! Renders one raster variable through the full pyramid pipeline and
//! writes `{z}/{x}/{y}.{ext}` tiles plus client tiling-scheme documents.

mod source;

use anyhow::{Context, Result};
use clap::Parser;
use pyramid::{RenderConfig, RenderContext, RenderParams, ValidRange, Variable};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tile_common::{TileCoord, TilingSchemeFormat};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use source::Pattern;

#[derive(Parser, Debug)]
#[command(name = "tile-render")]
#[command(about = "Render a raster variable to a static tile pyramid")]
struct Args {
    /// Raw little-endian f32 input file (synthetic field when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Synthetic pattern: wave or gradient
    #[arg(long, default_value = "wave")]
    pattern: String,

    /// Raster width in cells
    #[arg(long, default_value_t = 1440)]
    width: usize,

    /// Raster height in cells
    #[arg(long, default_value_t = 720)]
    height: usize,

    #[arg(long, default_value_t = -180.0, allow_negative_numbers = true)]
    west: f64,

    #[arg(long, default_value_t = 180.0, allow_negative_numbers = true)]
    east: f64,

    #[arg(long, default_value_t = -90.0, allow_negative_numbers = true)]
    south: f64,

    #[arg(long, default_value_t = 90.0, allow_negative_numbers = true)]
    north: f64,

    /// Rows run south to north
    #[arg(long)]
    lat_ascending: bool,

    /// Output directory
    #[arg(short, long, default_value = "./tiles")]
    output: PathBuf,

    /// Color ramp (default from DEFAULT_COLOR_RAMP)
    #[arg(long)]
    color_ramp: Option<String>,

    /// Lower bound of the color range; NaN uses the data minimum
    #[arg(long, allow_negative_numbers = true)]
    value_min: Option<f64>,

    /// Upper bound of the color range; NaN uses the data maximum
    #[arg(long, allow_negative_numbers = true)]
    value_max: Option<f64>,

    /// Value marking missing cells
    #[arg(long, allow_negative_numbers = true)]
    no_data: Option<f64>,

    /// Cells below this value are masked
    #[arg(long, allow_negative_numbers = true)]
    valid_min: Option<f64>,

    /// Cells above this value are masked
    #[arg(long, allow_negative_numbers = true)]
    valid_max: Option<f64>,

    /// Highest level to render (default: all)
    #[arg(long)]
    max_level: Option<usize>,

    /// Tile URL template written to the tiling-scheme documents
    #[arg(long, default_value = "{z}/{x}/{y}")]
    url: String,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_JSON")]
    json_logs: bool,
}

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = fmt().with_env_filter(filter).with_target(true).with_level(true);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args);

    let config = RenderConfig::from_env();
    if let Err(e) = config.validate() {
        anyhow::bail!("invalid configuration: {}", e);
    }
    let context = RenderContext::new(config).context("creating render context")?;
    let variable = load_variable(&args)?;
    let params = RenderParams {
        leading_indices: Vec::new(),
        color_ramp: args.color_ramp.clone(),
        value_min: args.value_min,
        value_max: args.value_max,
    };

    render(&context, &variable, &params, &args)
}

fn load_variable(args: &Args) -> Result<Variable> {
    let array = match &args.input {
        Some(path) => source::read_raw(path, args.width, args.height)?,
        None => {
            let pattern: Pattern = args.pattern.parse()?;
            source::synthetic(pattern, args.width, args.height)?
        }
    };

    let lon = source::cell_centers(args.west, args.east, args.width);
    let lat = if args.lat_ascending {
        source::cell_centers(args.south, args.north, args.height)
    } else {
        source::cell_centers(args.north, args.south, args.height)
    };

    let valid_range = match (args.valid_min, args.valid_max) {
        (None, None) => None,
        (min, max) => Some(ValidRange::new(min, max)),
    };

    let name = args
        .input
        .as_deref()
        .and_then(Path::file_stem)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.pattern.clone());

    Ok(Variable::new("local", name, array, lon, lat)
        .with_no_data(args.no_data)
        .with_valid_range(valid_range))
}

fn render(context: &RenderContext, var: &Variable, params: &RenderParams, args: &Args) -> Result<()> {
    let start = Instant::now();
    let pyramid = context.get_or_create_pyramid(var, params)?;
    let ext = context.image_format().extension();

    let last_level = pyramid.num_levels() - 1;
    let max_level = match args.max_level {
        Some(level) if level > last_level => {
            warn!(requested = level, available = last_level, "Clamping max level");
            last_level
        }
        Some(level) => level,
        None => last_level,
    };

    let mut total = 0;
    for z in 0..=max_level {
        let num_tiles = pyramid.tile_grid().num_tiles(z);
        let coords: Vec<TileCoord> = (0..num_tiles.height)
            .flat_map(|y| (0..num_tiles.width).map(move |x| TileCoord::new(z as u32, x as u32, y as u32)))
            .collect();

        coords.par_iter().try_for_each(|coord| -> Result<()> {
            let tile = pyramid
                .get_tile(coord.x as usize, coord.y as usize, z)?
                .into_bytes()?;
            let path = args.output.join(coord.path(ext));
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            }
            fs::write(&path, &tile).with_context(|| format!("writing {}", path.display()))?;
            Ok(())
        })?;

        info!(level = z, tiles = coords.len(), "Rendered level");
        total += coords.len();
    }

    let url = format!("{}.{}", args.url, ext);
    for format in [TilingSchemeFormat::OpenLayers, TilingSchemeFormat::Cesium] {
        let doc = context.tiling_scheme(var, &format.to_string(), &url)?;
        let path = args.output.join(format.file_name());
        fs::write(&path, serde_json::to_vec_pretty(&doc)?)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    let stats = context.stats();
    info!(
        tiles = total,
        levels = max_level + 1,
        elapsed_ms = start.elapsed().as_millis() as u64,
        mem_cache_bytes = stats.mem_cache.size_bytes,
        output = %args.output.display(),
        "Rendering complete"
    );
    Ok(())
}

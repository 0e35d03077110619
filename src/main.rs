use std::path::PathBuf;
use std::process;

use clap::Parser;
use glam::Vec3;
use image::RgbImage;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use terrain_relight::geo::{self, TileCoord};
use terrain_relight::stitch;
use terrain_relight::{RelightConfig, RelightError, RelightPreset, Relighter, RenderMode, Result};

#[derive(Parser, Debug)]
#[command(name = "terrain_relight")]
#[command(about = "Relight terrain-RGB elevation tiles with soft shadows and ambient occlusion")]
struct Args {
    /// Terrain-RGB elevation tile (repeat with --tiles-across to stitch a block)
    #[arg(short, long)]
    elevation: Vec<PathBuf>,

    /// Base color tile, in the same order as --elevation
    #[arg(short, long)]
    color: Vec<PathBuf>,

    /// Tiles per row when stitching repeated --elevation/--color inputs
    #[arg(long, default_value = "1")]
    tiles_across: usize,

    /// Elevation tile path template with {z}, {x} and {y} placeholders
    #[arg(long, requires_all = ["lat", "lon", "zoom"])]
    elevation_template: Option<String>,

    /// Color tile path template, paired with --elevation-template
    #[arg(long, requires = "elevation_template")]
    color_template: Option<String>,

    /// Latitude of the center tile (with --elevation-template)
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude of the center tile (with --elevation-template)
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Tiles loaded on each side of the center tile
    #[arg(long, default_value = "1")]
    radius: i64,

    /// Slippy-map zoom level of the input tiles
    #[arg(short, long)]
    zoom: Option<u32>,

    /// Western tile column of the input block (with --zoom) for pixel scale
    #[arg(long, requires = "zoom")]
    tile_x: Option<i64>,

    /// Ground meters per pixel (overrides any tile-derived value)
    #[arg(long)]
    pixel_scale: Option<f32>,

    /// Output PNG path
    #[arg(short, long, default_value = "relit.png")]
    output: PathBuf,

    /// Random seed (uses random seed if not specified)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Quality preset (ignored when --config is given)
    #[arg(long, value_enum)]
    preset: Option<RelightPreset>,

    /// Iterations for both the shadow and ambient passes
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Sun direction as x,y,z
    #[arg(long, allow_hyphen_values = true)]
    sun: Option<String>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective configuration as JSON
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// What to render: final, direct, elevation, shadow or ambient
    #[arg(short, long, default_value = "final")]
    mode: RenderMode,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

/// Stitched input rasters plus the tile columns they span, when known.
#[derive(Debug)]
struct Inputs {
    elevation: RgbImage,
    color: Option<RgbImage>,
    columns: Option<(i64, i64, u32)>,
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args) {
        error!("{e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let inputs = load_inputs(args)?;
    let mut config = build_config(args)?;

    if let Some(scale) = args.pixel_scale {
        config.pixel_scale = scale;
    } else if let Some((x0, x1, zoom)) = inputs.columns {
        config.pixel_scale = geo::pixel_scale_for_tiles(x0, x1, zoom, inputs.elevation.width());
    }

    if let Some(path) = &args.save_config {
        config.save(path)?;
        info!(path = %path.display(), "configuration saved");
    }

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    info!(
        seed,
        mode = %args.mode,
        width = inputs.elevation.width(),
        height = inputs.elevation.height(),
        pixel_scale = config.pixel_scale,
        shadow_iterations = config.shadow_iterations,
        ambient_iterations = config.ambient_iterations,
        "relighting"
    );

    let relighter = Relighter::new(config)?;
    let output = relighter.render(args.mode, &inputs.elevation, inputs.color.as_ref(), &mut rng)?;
    output.image.save(&args.output)?;

    info!(
        path = %args.output.display(),
        elapsed_ms = output.stats.elapsed.as_millis() as u64,
        "saved"
    );
    Ok(())
}

fn build_config(args: &Args) -> Result<RelightConfig> {
    let mut config = match (&args.config, args.preset) {
        (Some(path), _) => RelightConfig::load(path)?,
        (None, Some(preset)) => RelightConfig::from_preset(preset),
        (None, None) => RelightConfig::default(),
    };
    if let Some(iterations) = args.iterations {
        config.shadow_iterations = iterations;
        config.ambient_iterations = iterations;
    }
    if let Some(sun) = &args.sun {
        config.sun_direction = parse_sun(sun)?;
    }
    Ok(config)
}

fn load_inputs(args: &Args) -> Result<Inputs> {
    if let Some(template) = &args.elevation_template {
        let (Some(lat), Some(lon), Some(zoom)) = (args.lat, args.lon, args.zoom) else {
            return Err(RelightError::invalid("--elevation-template needs --lat, --lon and --zoom"));
        };
        if args.radius < 0 {
            return Err(RelightError::invalid("--radius must not be negative"));
        }
        let center = TileCoord::containing(lat, lon, zoom);
        info!(zoom, x = center.x, y = center.y, radius = args.radius, "loading tile neighbourhood");
        let elevation = stitch::load_region(template, center, args.radius)?;
        let color = args
            .color_template
            .as_deref()
            .map(|t| stitch::load_region(t, center, args.radius))
            .transpose()?;
        return Ok(Inputs {
            elevation,
            color,
            columns: Some((center.x - args.radius, center.x + args.radius + 1, zoom)),
        });
    }

    if args.elevation.is_empty() {
        return Err(RelightError::invalid("no elevation input; use --elevation or --elevation-template"));
    }
    if !args.color.is_empty() && args.color.len() != args.elevation.len() {
        return Err(RelightError::invalid(format!(
            "{} color tiles given for {} elevation tiles",
            args.color.len(),
            args.elevation.len()
        )));
    }

    let elevation = load_block(&args.elevation, args.tiles_across)?;
    let color = if args.color.is_empty() {
        None
    } else {
        Some(load_block(&args.color, args.tiles_across)?)
    };
    let columns = match (args.zoom, args.tile_x) {
        (Some(zoom), Some(x0)) => Some((x0, x0 + args.tiles_across as i64, zoom)),
        _ => None,
    };
    Ok(Inputs { elevation, color, columns })
}

fn load_block(paths: &[PathBuf], columns: usize) -> Result<RgbImage> {
    if paths.len() == 1 {
        return stitch::load_rgb(&paths[0]);
    }
    let tiles = paths.iter().map(stitch::load_rgb).collect::<Result<Vec<_>>>()?;
    stitch::stitch_tiles(&tiles, columns)
}

fn parse_sun(s: &str) -> Result<Vec3> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| RelightError::invalid(format!("bad sun direction '{s}': {e}")))?;
    match parts[..] {
        [x, y, z] => Ok(Vec3::new(x, y, z)),
        _ => Err(RelightError::invalid(format!("sun direction needs three components, got '{s}'"))),
    }
}

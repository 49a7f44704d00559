//! geoverlay CLI - vector overlay operations on GeoJSON files

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use geoverlay_algorithms::manager::LayerManager;
use geoverlay_algorithms::vector::{
    find_all_intersections, polygon_spatial_join, union_with_analysis, validate,
    validate_buffer_input, validate_difference_input, validate_intersection_input,
    validate_union_input, Aggregation, InputValidation, OperationResult, PolygonJoinParams,
    Predicate, DEFAULT_BUFFER_DISTANCE,
};
use geoverlay_core::io::{read_feature_collection, write_feature_collection};
use geoverlay_core::{Feature, FeatureCollection, LayerSource, OperationOptions};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geoverlay")]
#[command(author, version, about = "Vector overlay operations on GeoJSON", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every operation subcommand
#[derive(Args)]
struct OperationArgs {
    /// Output GeoJSON file
    #[arg(short, long)]
    output: PathBuf,
    /// Also write the operation metadata as JSON
    #[arg(long)]
    metadata: Option<PathBuf>,
    /// Operation options as a JSON object, e.g. '{"preserveProperties": true}'
    #[arg(long)]
    options: Option<String>,
    /// Skip features with more vertices than this
    #[arg(long)]
    max_vertices: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a GeoJSON file
    Info {
        /// Input GeoJSON file
        input: PathBuf,
    },
    /// Check geometry validity, and optionally an operation's input
    Validate {
        /// Input GeoJSON files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Also check the combined input for this operation
        #[arg(long)]
        operation: Option<String>,
    },
    /// Merge polygons into one feature
    Union {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Keep source properties on the merged feature
        #[arg(long)]
        preserve_properties: bool,
        /// Attach the pairwise relationship matrix to the metadata
        #[arg(long)]
        analysis: bool,
        #[command(flatten)]
        common: OperationArgs,
    },
    /// Intersect features
    Intersection {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Intersect every polygon pair separately
        #[arg(long)]
        all_pairs: bool,
        #[command(flatten)]
        common: OperationArgs,
    },
    /// Subtract polygons from the first polygon, or from points or lines
    Difference {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[command(flatten)]
        common: OperationArgs,
    },
    /// Buffer every feature by a distance
    Buffer {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Buffer distance; negative shrinks polygons
        #[arg(short, long, default_value_t = DEFAULT_BUFFER_DISTANCE, allow_hyphen_values = true)]
        distance: f64,
        /// Distance units: meters, kilometers, miles, feet
        #[arg(short, long, default_value = "meters")]
        units: String,
        /// Segments per full circle
        #[arg(short, long, default_value = "8")]
        steps: usize,
        #[command(flatten)]
        common: OperationArgs,
    },
    /// Join points to the polygons containing them
    SpatialJoin {
        /// Point layer
        points: PathBuf,
        /// Polygon layer
        polygons: PathBuf,
        /// One output feature per matching polygon
        #[arg(long)]
        multiple: bool,
        /// List unmatched points in the metadata
        #[arg(long)]
        include_unmatched: bool,
        #[command(flatten)]
        common: OperationArgs,
    },
    /// Count the points inside each polygon
    CountPoints {
        /// Point layer
        points: PathBuf,
        /// Polygon layer
        polygons: PathBuf,
        #[command(flatten)]
        common: OperationArgs,
    },
    /// Join polygons to target polygons by a spatial predicate
    PolygonJoin {
        /// Source polygons
        sources: PathBuf,
        /// Target polygons
        targets: PathBuf,
        /// Predicate: intersects, contains, within, overlaps, touches
        #[arg(short, long, default_value = "intersects")]
        relation: String,
        /// Aggregate numeric target properties: sum, average, min, max, count
        #[arg(short, long)]
        aggregate: Option<String>,
        #[command(flatten)]
        common: OperationArgs,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_layer(path: &Path) -> Result<FeatureCollection> {
    let pb = spinner("Reading features...");
    let fc = read_feature_collection(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} ({} features)", path.display(), fc.len());
    Ok(fc)
}

fn layer_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_all(paths: &[PathBuf]) -> Result<Vec<Feature>> {
    let mut features = Vec::new();
    for path in paths {
        features.extend(read_layer(path)?);
    }
    Ok(features)
}

impl OperationArgs {
    fn options(&self) -> Result<OperationOptions> {
        let mut options = match &self.options {
            Some(text) => {
                let value: serde_json::Value =
                    serde_json::from_str(text).context("--options is not valid JSON")?;
                OperationOptions::from_json(value)?
            }
            None => OperationOptions::default(),
        };
        if let Some(max) = self.max_vertices {
            options = options.with_max_vertices(max);
        }
        Ok(options)
    }
}

/// Load each input file as one selected layer and run `operation` over them.
fn run_on_layers(
    operation: &str,
    inputs: &[PathBuf],
    options: &OperationOptions,
) -> Result<(OperationResult, FeatureCollection)> {
    let mut manager = LayerManager::new();
    for path in inputs {
        let id = manager.add(layer_name(path), read_layer(path)?, LayerSource::Uploaded);
        manager.set_selected_for_operation(id, true)?;
    }

    let pb = spinner(&format!("Running {operation}..."));
    let (result, id) = manager.run_operation(operation, options);
    pb.finish_and_clear();

    let data = id
        .and_then(|id| manager.get(id))
        .map(|layer| layer.data.clone())
        .unwrap_or_default();
    Ok((result, data))
}

fn finish(result: OperationResult, data: &FeatureCollection, common: &OperationArgs, start: Instant) -> Result<()> {
    if !result.success {
        bail!(result.message());
    }
    for w in &result.warnings {
        warn!("{}", w);
    }

    let pb = spinner("Writing output...");
    write_feature_collection(data, &common.output).context("Failed to write output")?;
    if let Some(path) = &common.metadata {
        let text = serde_json::to_string_pretty(&result)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    pb.finish_and_clear();

    println!("{}", result.message());
    println!("Result saved to: {}", common.output.display());
    println!("  Processing time: {:.2?}", start.elapsed());
    Ok(())
}

fn print_report(label: &str, report: &InputValidation) {
    println!("{} input: {}", label, if report.valid { "valid" } else { "invalid" });
    let c = report.counts;
    println!(
        "  Points: {}, lines: {}, polygons: {}, unsupported: {}",
        c.points, c.lines, c.polygons, c.unsupported
    );
    for e in &report.errors {
        println!("  error: {}", e);
    }
    for w in &report.warnings {
        println!("  warning: {}", w);
    }
    for d in &report.details {
        println!("  {}", d);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => {
            let fc = read_layer(&input)?;
            println!("File: {}", input.display());
            println!("Features: {}", fc.len());
            let types: Vec<String> = fc.geometry_types().into_iter().collect();
            println!("Geometry types: {}", types.join(", "));
            if let Some(b) = fc.bounds() {
                println!(
                    "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                    b.min_lng, b.min_lat, b.max_lng, b.max_lat
                );
            }
            let invalid = fc.iter().filter(|f| !validate(f).valid).count();
            println!("Invalid geometries: {}", invalid);
        }

        Commands::Validate { inputs, operation } => {
            let features = read_all(&inputs)?;
            for (i, f) in features.iter().enumerate() {
                let v = validate(f);
                if !v.valid {
                    println!("Feature {}: {}", i + 1, v.issues.join("; "));
                }
                for w in &v.warnings {
                    println!("Feature {}: warning: {}", i + 1, w);
                }
            }
            if let Some(op) = operation {
                let report = match op.as_str() {
                    "union" => validate_union_input(&features),
                    "intersection" => validate_intersection_input(&features),
                    "difference" => validate_difference_input(&features),
                    "buffer" => validate_buffer_input(
                        &features,
                        DEFAULT_BUFFER_DISTANCE,
                        &OperationOptions::default(),
                    ),
                    other => bail!("No input check for operation: {}", other),
                };
                print_report(&op, &report);
            }
        }

        Commands::Union {
            inputs,
            preserve_properties,
            analysis,
            common,
        } => {
            let options = common.options()?.with_preserved_properties(preserve_properties);
            let start = Instant::now();
            if analysis {
                let features = read_all(&inputs)?;
                let result = union_with_analysis(&features, &options)?;
                let data = result.result.clone();
                finish(result, &data, &common, start)?;
            } else {
                let (result, data) = run_on_layers("union", &inputs, &options)?;
                finish(result, &data, &common, start)?;
            }
        }

        Commands::Intersection {
            inputs,
            all_pairs,
            common,
        } => {
            let options = common.options()?;
            let start = Instant::now();
            if all_pairs {
                let features = read_all(&inputs)?;
                let result = find_all_intersections(&features, &options)?;
                let data = result.result.clone();
                finish(result, &data, &common, start)?;
            } else {
                let (result, data) = run_on_layers("intersection", &inputs, &options)?;
                finish(result, &data, &common, start)?;
            }
        }

        Commands::Difference { inputs, common } => {
            let options = common.options()?;
            let start = Instant::now();
            let (result, data) = run_on_layers("difference", &inputs, &options)?;
            finish(result, &data, &common, start)?;
        }

        Commands::Buffer {
            inputs,
            distance,
            units,
            steps,
            common,
        } => {
            let options = common
                .options()?
                .with_distance(distance)
                .with_units(units)
                .with_steps(steps);
            let start = Instant::now();
            let (result, data) = run_on_layers("buffer", &inputs, &options)?;
            finish(result, &data, &common, start)?;
        }

        Commands::SpatialJoin {
            points,
            polygons,
            multiple,
            include_unmatched,
            common,
        } => {
            let options = common
                .options()?
                .with_multiple_matches(multiple)
                .with_unmatched(include_unmatched);
            let start = Instant::now();
            let (result, data) = run_on_layers("spatial-join", &[points, polygons], &options)?;
            finish(result, &data, &common, start)?;
        }

        Commands::CountPoints {
            points,
            polygons,
            common,
        } => {
            let options = common.options()?;
            let start = Instant::now();
            let (result, data) = run_on_layers("count-points", &[points, polygons], &options)?;
            finish(result, &data, &common, start)?;
        }

        Commands::PolygonJoin {
            sources,
            targets,
            relation,
            aggregate,
            common,
        } => {
            let params = PolygonJoinParams {
                relation: relation.parse::<Predicate>()?,
                aggregation: aggregate.map(|a| a.parse::<Aggregation>()).transpose()?,
                max_vertices: common.max_vertices,
            };
            let sources = read_layer(&sources)?.features;
            let targets = read_layer(&targets)?.features;
            let start = Instant::now();
            let result = polygon_spatial_join(&sources, &targets, &params)
                .context("Polygon join failed")?;
            let data = result.result.clone();
            finish(result, &data, &common, start)?;
        }
    }

    Ok(())
}

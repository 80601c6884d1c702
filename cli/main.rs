#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use foodsec::config::DashboardConfig;
use foodsec::drift::DriftReport;
use foodsec::forecast::{ForecastError, ForecastStore};
use foodsec::overview::{
    Overview, correlation_matrix, importance_drift, importance_shares, load_feature_importance,
};
use foodsec::predict::{PredictionError, PredictionService, Predictor, RegressionForest};
use foodsec::table::{TableError, load_feature_table};
use foodsec::{AlignError, FeatureAligner, FeatureInput, FeatureSchema, InputError, SchemaStore};

/// Exit status for failures the operator has to fix (artifacts, configuration).
const EXIT_OPERATOR: i32 = 1;
/// Exit status for failures the caller can fix by resubmitting different input.
const EXIT_CALLER: i32 = 3;

#[derive(Parser)]
#[command(
    name = "foodsec",
    version,
    about = "Feature alignment and prediction toolkit for the ASEAN food insecurity dashboard",
    long_about = "Aligns named feature inputs to the order a trained regressor expects, \
                 runs predictions, and serves the forecast and overview artifacts the \
                 dashboard displays."
)]
struct Cli {
    /// Configuration file; defaults to ./foodsec.toml when present
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct InputArgs {
    /// Start from the prediction form's default values
    #[arg(long)]
    form: bool,

    /// TOML file mapping feature names to values
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Feature assignment, repeatable; applied after --form and --input
    #[arg(long = "set", value_name = "NAME=VALUE")]
    assignments: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the aligned feature vector in schema order
    #[command(about = "Align a feature mapping to the schema order")]
    Align(InputArgs),

    /// Align the input and run the trained model
    #[command(about = "Predict the food insecurity rate for one input")]
    Predict(InputArgs),

    /// Batch prediction over a table whose columns are feature names
    #[command(about = "Predict every row of a CSV/TSV table (outputs: id, prediction)")]
    PredictTable {
        /// CSV or TSV file with a header row
        #[arg(value_name = "TABLE")]
        table: PathBuf,

        /// Column whose values identify rows in the output
        #[arg(long, value_name = "NAME")]
        id_column: Option<String>,

        /// Write predictions here instead of standard output
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Print a country's forecast with growth rates
    #[command(about = "Show the forecast table for one country")]
    Forecast {
        #[arg(value_name = "COUNTRY")]
        country: String,
    },

    /// Summarise the exploratory dataset and the feature ranking
    #[command(about = "Regional overview metrics and feature importance")]
    Overview,

    /// Compare every producer of feature names with the schema
    #[command(about = "Check form, model and feature-importance names against the schema")]
    Check,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { config, command } = cli;

    let Some(command) = command else {
        if Cli::command().print_help().is_err() {
            process::exit(EXIT_OPERATOR);
        }
        println!();
        return;
    };

    let result = DashboardConfig::discover(config.as_deref())
        .map_err(Box::<dyn Error>::from)
        .and_then(|config| match command {
            Commands::Align(args) => run_align(&config, &args),
            Commands::Predict(args) => run_predict(&config, &args),
            Commands::PredictTable {
                table,
                id_column,
                out,
            } => run_predict_table(&config, &table, id_column.as_deref(), out.as_deref()),
            Commands::Forecast { country } => run_forecast(&config, &country),
            Commands::Overview => run_overview(&config),
            Commands::Check => run_check(&config),
        });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(exit_code(e.as_ref()));
    }
}

/// Maps a failure to the exit status of its class.
fn exit_code(err: &(dyn Error + 'static)) -> i32 {
    let caller = if let Some(e) = err.downcast_ref::<PredictionError>() {
        e.is_caller_error()
    } else if let Some(e) = err.downcast_ref::<TableError>() {
        e.is_caller_error()
    } else {
        err.is::<AlignError>() || err.is::<InputError>()
    };
    if caller { EXIT_CALLER } else { EXIT_OPERATOR }
}

/// Builds the request: form defaults, then the input file, then `--set`.
fn collect_input(config: &DashboardConfig, args: &InputArgs) -> Result<FeatureInput, InputError> {
    let mut input = if args.form {
        config.form_defaults()
    } else {
        FeatureInput::new()
    };
    if let Some(path) = &args.input {
        input.extend(FeatureInput::from_toml_file(path)?);
    }
    input.extend(FeatureInput::from_assignments(&args.assignments)?);

    for key in input.keys() {
        let (Some(field), Some(value)) = (
            config.form_field(key),
            input.get(key).and_then(|v| v.to_number()),
        ) else {
            continue;
        };
        if !field.accepts(value) {
            log::warn!(
                "{} = {} lies outside the form range [{}, {}]",
                field.label,
                value,
                field.min,
                field.max
            );
        }
    }
    Ok(input)
}

fn run_align(config: &DashboardConfig, args: &InputArgs) -> Result<(), Box<dyn Error>> {
    let input = collect_input(config, args)?;
    let store = SchemaStore::new(&config.paths.schema);
    let schema = store.get()?;
    if args.form {
        warn_form_drift(config, &schema);
    }
    let aligner = FeatureAligner::new(schema);
    let aligned = aligner.align(&input)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (name, value) in aligner.schema().names().iter().zip(aligned.as_slice()) {
        writeln!(out, "{name}\t{}", ryu::Buffer::new().format(*value))?;
    }
    Ok(())
}

/// Logs a warning for each way the form's fields drift from the schema.
fn warn_form_drift(config: &DashboardConfig, schema: &FeatureSchema) {
    let drift = DriftReport::compare(schema, config.form.iter().map(|field| field.key.as_str()));
    if drift.is_compatible() {
        return;
    }
    for line in drift.to_string().lines() {
        log::warn!("form: {line}");
    }
}

fn open_service(
    config: &DashboardConfig,
    store: &SchemaStore,
) -> Result<PredictionService<RegressionForest>, PredictionError> {
    let model = RegressionForest::load(&config.paths.model)?;
    PredictionService::open(store, model)
}

fn run_predict(config: &DashboardConfig, args: &InputArgs) -> Result<(), Box<dyn Error>> {
    let input = collect_input(config, args)?;
    let store = SchemaStore::new(&config.paths.schema);
    if args.form {
        warn_form_drift(config, &*store.get()?);
    }
    let service = open_service(config, &store)?;
    let prediction = service.predict(&input)?;
    println!("Predicted food insecurity rate: {prediction:.2}");
    Ok(())
}

fn run_predict_table(
    config: &DashboardConfig,
    table_path: &Path,
    id_column: Option<&str>,
    out_path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let store = SchemaStore::new(&config.paths.schema);
    let service = open_service(config, &store)?;
    let table = load_feature_table(table_path, service.aligner().schema(), id_column)?;
    let predictions = service.predict_rows(table.rows.view())?;

    let sink: Box<dyn Write> = match out_path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(sink);
    let mut buffer = ryu::Buffer::new();
    writeln!(writer, "id\tprediction")?;
    for (id, prediction) in table.row_ids.iter().zip(predictions.iter()) {
        writeln!(writer, "{id}\t{}", buffer.format(*prediction))?;
    }
    writer.flush()?;

    if let Some(path) = out_path {
        log::info!("Wrote {} predictions to '{}'", table.len(), path.display());
    }
    Ok(())
}

fn run_forecast(config: &DashboardConfig, country: &str) -> Result<(), Box<dyn Error>> {
    let store = ForecastStore::new(&config.paths.forecast_dir);
    let table = match store.load(country) {
        Ok(table) => table,
        Err(e @ ForecastError::NotAvailable { .. }) => {
            if let Ok(available) = store.countries() {
                if !available.is_empty() {
                    log::warn!("Forecasts are available for: {}", available.join(", "));
                }
            }
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Forecast for {}", table.country);
    println!("ds\tyhat\tyhat_lower\tyhat_upper\tgrowth_pct");
    for (point, growth) in table.points.iter().zip(table.growth_rates()) {
        let growth = growth.map_or_else(|| "NA".to_string(), |g| format!("{g:.2}"));
        println!(
            "{}\t{:.2}\t{:.2}\t{:.2}\t{}",
            point.ds, point.yhat, point.yhat_lower, point.yhat_upper, growth
        );
    }
    Ok(())
}

fn run_overview(config: &DashboardConfig) -> Result<(), Box<dyn Error>> {
    let overview = Overview::load(&config.paths.dataset)?;
    println!("Average food insecurity rate: {:.2}%", overview.mean_rate);
    println!(
        "Highest: {} ({:.2}%)",
        overview.highest.country, overview.highest.mean
    );
    println!(
        "Lowest: {} ({:.2}%)",
        overview.lowest.country, overview.lowest.mean
    );
    println!();
    println!("country\tmean_rate");
    for (country, mean) in &overview.country_means {
        println!("{country}\t{mean:.2}");
    }

    let correlations = correlation_matrix(&config.paths.dataset)?;
    println!();
    println!("correlation\t{}", correlations.columns.join("\t"));
    for (name, row) in correlations.columns.iter().zip(correlations.values.rows()) {
        let cells: Vec<String> = row
            .iter()
            .map(|r| if r.is_finite() { format!("{r:.3}") } else { "NA".to_string() })
            .collect();
        println!("{name}\t{}", cells.join("\t"));
    }

    // The ranking is optional; a dashboard without it still has an overview.
    if config.paths.feature_importance.is_file() {
        let ranking = load_feature_importance(&config.paths.feature_importance)?;
        println!();
        println!("feature\timportance\tshare");
        for (row, share) in ranking.iter().zip(importance_shares(&ranking)) {
            println!("{}\t{:.4}\t{:.1}%", row.feature, row.importance, share * 100.0);
        }
    } else {
        log::info!(
            "No feature importance table at '{}'",
            config.paths.feature_importance.display()
        );
    }
    Ok(())
}

fn run_check(config: &DashboardConfig) -> Result<(), Box<dyn Error>> {
    let store = SchemaStore::new(&config.paths.schema);
    let schema = store.get()?;
    println!(
        "Schema '{}': {} features{}",
        store.path().display(),
        schema.len(),
        schema
            .version()
            .map(|v| format!(" (version {v})"))
            .unwrap_or_default()
    );

    let mut consistent = true;

    let form_keys = config.form.iter().map(|field| field.key.as_str());
    consistent &= report("form", &DriftReport::compare(&schema, form_keys));

    if config.paths.model.is_file() {
        let model = RegressionForest::load(&config.paths.model)?;
        let names = model.feature_names().unwrap_or_default();
        consistent &= report(
            "model",
            &DriftReport::compare(&schema, names.iter().map(String::as_str)),
        );
        if let Err(e) = PredictionService::new(schema.clone(), model) {
            log::warn!("{e}");
            consistent = false;
        }
    } else {
        log::warn!("No model at '{}'", config.paths.model.display());
    }

    if config.paths.feature_importance.is_file() {
        let ranking = load_feature_importance(&config.paths.feature_importance)?;
        consistent &= report("feature importance", &importance_drift(&schema, &ranking));
    }

    if consistent {
        println!("All producers can satisfy the schema.");
        Ok(())
    } else {
        Err("feature names drift from the schema; see the report above".into())
    }
}

/// Prints one report and returns whether the producer is compatible.
fn report(producer: &str, drift: &DriftReport) -> bool {
    println!("[{producer}]");
    for line in drift.to_string().lines() {
        println!("  {line}");
    }
    if !drift.is_compatible() {
        log::warn!("{producer} cannot supply every schema feature");
    }
    drift.is_compatible()
}

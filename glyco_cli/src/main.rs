use chrono::{DateTime, Duration, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use glyco_core::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Readings considered by `trend` and `watch`
const TREND_LOOKBACK_MINUTES: i64 = 60;

#[derive(Parser)]
#[command(name = "glyco")]
#[command(about = "Glucose monitoring and insulin/carb tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a glucose reading
    Reading {
        /// Glucose value in mg/dL
        #[arg(long)]
        value: f64,

        /// Reading time (RFC 3339, default now)
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,
    },

    /// Log a treatment (meal-bolus, snack-bolus, correction-bolus, long-acting,
    /// combo-bolus, temp-basal, carb-correction)
    Log {
        event_type: String,

        /// Insulin units
        #[arg(long)]
        insulin: Option<f64>,

        /// Carbohydrates in grams
        #[arg(long)]
        carbs: Option<f64>,

        /// Duration in minutes (temp basal, combo bolus)
        #[arg(long)]
        duration: Option<f64>,

        /// Temp basal rate in U/h, or percent of schedule with --relative
        #[arg(long)]
        rate: Option<f64>,

        /// Interpret --rate as a percentage of the scheduled basal rate
        #[arg(long, requires = "rate")]
        relative: bool,

        /// Combo bolus: units delivered immediately
        #[arg(long)]
        immediate: Option<f64>,

        /// Combo bolus: units delivered over --duration
        #[arg(long)]
        extended: Option<f64>,

        #[arg(long)]
        notes: Option<String>,

        /// Event time (RFC 3339, default now)
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,
    },

    /// Import readings from a CGM CSV export
    Import { path: PathBuf },

    /// Show insulin on board
    Iob {
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,
    },

    /// Show carbs on board
    Cob {
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,
    },

    /// Show the current trend and a 60-minute prediction
    Trend {
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,
    },

    /// Full statistics report
    Report {
        /// Number of days to analyze
        #[arg(long, default_value_t = 14)]
        days: i64,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,

        /// End of the report window (RFC 3339, default now)
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,
    },

    /// Poll the journals and print glucose, IOB and COB periodically
    Watch {
        /// Stop after this many polls (default: run until interrupted)
        #[arg(long)]
        iterations: Option<u64>,

        /// Seconds between polls (default: monitor.poll_interval_seconds)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

fn main() -> Result<()> {
    // Initialize logging
    glyco_core::logging::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let store = JournalStore::open(&data_dir);

    match cli.command {
        Commands::Reading { value, at } => cmd_reading(&store, value, at),
        Commands::Log {
            event_type,
            insulin,
            carbs,
            duration,
            rate,
            relative,
            immediate,
            extended,
            notes,
            at,
        } => {
            let event_type = EventType::parse(&event_type).ok_or_else(|| {
                let known: Vec<&str> = EventType::all().iter().map(|e| e.as_str()).collect();
                Error::Other(format!(
                    "Unknown event type {:?} (expected one of: {})",
                    event_type,
                    known.join(", ")
                ))
            })?;
            let treatment = Treatment {
                insulin_units: insulin,
                carbs_grams: carbs,
                duration_minutes: duration,
                rate,
                rate_mode: rate.map(|_| {
                    if relative {
                        RateMode::Relative
                    } else {
                        RateMode::Absolute
                    }
                }),
                immediate_insulin_units: immediate,
                extended_insulin_units: extended,
                notes,
                ..Treatment::new(event_type, at.unwrap_or_else(Utc::now))
            };
            cmd_log(&store, &treatment)
        }
        Commands::Import { path } => cmd_import(&store, &path),
        Commands::Iob { at } => cmd_iob(&store, &config, at.unwrap_or_else(Utc::now)),
        Commands::Cob { at } => cmd_cob(&store, &config, at.unwrap_or_else(Utc::now)),
        Commands::Trend { at } => cmd_trend(&store, &config, at.unwrap_or_else(Utc::now)),
        Commands::Report { days, json, at } => {
            cmd_report(&store, &config, days, json, at.unwrap_or_else(Utc::now))
        }
        Commands::Watch {
            iterations,
            interval_secs,
        } => cmd_watch(
            &store,
            &config,
            iterations,
            interval_secs.unwrap_or(config.monitor.poll_interval_seconds),
        ),
    }
}

fn cmd_reading(store: &JournalStore, value: f64, at: Option<DateTime<Utc>>) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::Other(format!(
            "Glucose value must be positive (got {})",
            value
        )));
    }

    let reading = GlucoseReading::new(at.unwrap_or_else(Utc::now), value);
    store.record_reading(&reading)?;
    println!("✓ Recorded {} mg/dL at {}", value, reading.timestamp.to_rfc3339());
    Ok(())
}

fn cmd_log(store: &JournalStore, treatment: &Treatment) -> Result<()> {
    validate_treatment(treatment)?;
    let id = store.record_treatment(treatment)?;
    println!("✓ Logged {} ({})", treatment.event_type.as_str(), id);
    Ok(())
}

/// Reject treatments that would contribute nothing to IOB or COB
fn validate_treatment(treatment: &Treatment) -> Result<()> {
    let missing = |what: &str| -> Result<()> {
        Err(Error::Other(format!(
            "{} requires {}",
            treatment.event_type.as_str(),
            what
        )))
    };

    match treatment.event_type {
        e if e.is_rapid_bolus() && treatment.insulin_units.is_none() => missing("--insulin"),
        EventType::LongActing if treatment.insulin_units.is_none() => missing("--insulin"),
        EventType::ComboBolus
            if treatment.immediate_insulin_units.is_none()
                && treatment.insulin_units.is_none()
                && treatment.extended_insulin_units.is_none() =>
        {
            missing("--immediate, --extended or --insulin")
        }
        EventType::ComboBolus
            if treatment.extended_insulin_units.is_some()
                && treatment.duration_minutes.is_none() =>
        {
            missing("--duration for the extended part")
        }
        EventType::TempBasal
            if treatment.rate.is_none() || treatment.duration_minutes.is_none() =>
        {
            missing("--rate and --duration")
        }
        EventType::CarbCorrection if treatment.carbs_grams.is_none() => missing("--carbs"),
        _ => Ok(()),
    }
}

fn cmd_import(store: &JournalStore, path: &Path) -> Result<()> {
    let (readings, summary) = import_readings_csv(path)?;
    store.record_readings(&readings)?;

    println!("✓ Imported {} readings", summary.imported);
    if summary.skipped > 0 {
        println!("  Skipped {} malformed rows", summary.skipped);
    }
    Ok(())
}

fn treatment_window(
    store: &JournalStore,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<Vec<Treatment>> {
    let start = now - Duration::hours(config.monitor.lookback_hours);
    store.treatments(start, now, None)
}

fn cmd_iob(store: &JournalStore, config: &Config, now: DateTime<Utc>) -> Result<()> {
    let treatments = treatment_window(store, config, now)?;
    let iob = insulin_on_board(&treatments, now, &config.model);

    println!("IOB: {:.2} U", iob.total);
    println!("  Bolus: {:.2} U", iob.bolus);
    if config.model.basal_rate > 0.0 {
        println!("  Basal: {:.2} U", iob.basal);
    }
    Ok(())
}

fn cmd_cob(store: &JournalStore, config: &Config, now: DateTime<Utc>) -> Result<()> {
    let treatments = treatment_window(store, config, now)?;
    let cob = carbs_on_board(&treatments, now, config.model.carb_absorption_rate);

    println!("COB: {:.1} g", cob);
    Ok(())
}

fn cmd_trend(store: &JournalStore, config: &Config, now: DateTime<Utc>) -> Result<()> {
    let readings = store.readings(now - Duration::minutes(TREND_LOOKBACK_MINUTES), now)?;
    let offset = config.display.offset();

    let Some(latest) = readings.last() else {
        println!("No readings in the last {} minutes.", TREND_LOOKBACK_MINUTES);
        return Ok(());
    };

    println!(
        "Latest: {} mg/dL at {}",
        latest.value,
        local_time(latest.timestamp, &offset)
    );

    match bucketed_delta(&readings) {
        Some(delta) => {
            println!(
                "Delta: {:+.1} mg/dL {} ({:?})",
                delta.mgdl,
                delta.direction.arrow(),
                delta.direction
            );
            print_prediction(&predict(&readings), &offset);
        }
        None => println!("Not enough recent readings for a trend."),
    }
    Ok(())
}

fn print_prediction(prediction: &[PredictedPoint], offset: &FixedOffset) {
    if prediction.is_empty() {
        return;
    }

    println!();
    println!("Prediction (heuristic extrapolation, not medical advice):");
    for point in prediction.iter().skip(2).step_by(3) {
        println!("  {}  {} mg/dL", local_time(point.at, offset), point.value);
    }
}

fn cmd_report(
    store: &JournalStore,
    config: &Config,
    days: i64,
    json: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    if days <= 0 {
        return Err(Error::Other("--days must be positive".into()));
    }

    let window = ReportWindow::last_days(now, days);
    let readings = store.readings(window.start, window.end)?;
    let treatments = treatment_window(store, config, now)?;
    let report = build_report(&readings, &treatments, config, window);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display_report(&report, &config.display.offset());
    }
    Ok(())
}

fn display_report(report: &GlucoseReport, offset: &FixedOffset) {
    let s = &report.summary;
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  GLUCOSE REPORT");
    println!("╰─────────────────────────────────────────╯");
    println!(
        "  {} → {}",
        local_time(report.window.start, offset),
        local_time(report.window.end, offset)
    );
    println!();

    if s.count == 0 {
        println!("  No readings in this window.");
        println!();
        return;
    }

    println!("  Readings: {}", s.count);
    println!("  Mean: {} mg/dL  Median: {} mg/dL", s.mean, s.median);
    println!("  SD: {}  CV: {}%", s.std_dev, s.cv_percent);
    println!("  Range: {} - {} mg/dL", s.min, s.max);
    println!("  GMI: {}%  Estimated A1c: {}%", s.gmi, s.estimated_a1c);
    println!();

    let p = &report.time_in_range.percentages;
    println!("  Time in range:");
    println!("    Very low:  {:5.1}%", p.very_low);
    println!("    Low:       {:5.1}%", p.low);
    println!("    In range:  {:5.1}%", p.in_range);
    println!("    High:      {:5.1}%", p.high);
    println!("    Very high: {:5.1}%", p.very_high);
    println!();

    let d = &report.distribution;
    println!("  Variability:");
    println!("    GVI: {} ({:?})  PGS: {}", d.gvi, d.gvi_class, d.pgs);
    println!("    J-Index: {}  IQR: {}", d.j_index, d.iqr);
    println!("    Mean daily change: {}", d.mean_daily_change);
    println!("    Out-of-range RMS: {}", d.out_of_range_rms);
    println!(
        "    Time in fluctuation: {}% (rapid {}%)",
        d.time_in_fluctuation, d.time_in_rapid_fluctuation
    );
    println!();

    if report.patterns.is_empty() {
        println!("  No patterns detected.");
    } else {
        println!("  Patterns:");
        for pattern in &report.patterns {
            println!("    [{:?}] {}", pattern.severity, pattern.description);
        }
    }
    println!();

    println!("  IOB: {:.2} U  COB: {:.1} g", report.iob.total, report.cob);
    if let Some(delta) = &report.delta {
        println!("  Trend: {:+.1} mg/dL {}", delta.mgdl, delta.direction.arrow());
    }
    print_prediction(&report.prediction, offset);
    println!();
}

fn cmd_watch(
    store: &JournalStore,
    config: &Config,
    iterations: Option<u64>,
    interval_secs: u64,
) -> Result<()> {
    let cache: FetchCache<i64, Vec<Treatment>> = FetchCache::new(config.cache.ttl());
    let offset = config.display.offset();
    let mut last_marker = store.modified_marker();
    let mut polls = 0u64;
    let mut last_insulin: Option<(f64, f64)> = None;
    let mut last_glucose: Option<String> = None;

    tracing::info!(
        "Watching {:?} every {}s (cache ttl {:?})",
        iterations,
        interval_secs,
        cache.ttl()
    );

    loop {
        let marker = store.modified_marker();
        if marker != last_marker {
            cache.invalidate();
            last_marker = marker;
        }

        let now = Utc::now();
        let fetch_treatments = || -> Result<Arc<Vec<Treatment>>> {
            cache.get_or_fetch(config.monitor.lookback_hours, || {
                treatment_window(store, config, now)
            })
        };

        // IOB and COB each ask for the window; the cache serves both from one fetch
        let insulin = fetch_treatments().and_then(|treatments| {
            let iob = insulin_on_board(&treatments, now, &config.model).total;
            let cob = carbs_on_board(
                &fetch_treatments()?,
                now,
                config.model.carb_absorption_rate,
            );
            Ok((iob, cob))
        });
        let insulin = match insulin {
            Ok(values) => {
                last_insulin = Some(values);
                InsulinLine::Fresh(values)
            }
            Err(e) => {
                tracing::warn!("Treatment fetch failed, keeping last values: {}", e);
                last_insulin.map_or(InsulinLine::Unavailable, InsulinLine::Stale)
            }
        };

        let glucose = match store.readings(now - Duration::minutes(TREND_LOOKBACK_MINUTES), now) {
            Ok(readings) => {
                let line = glucose_line(&readings);
                last_glucose = Some(line.clone());
                line
            }
            Err(e) => {
                tracing::warn!("Reading fetch failed, keeping last value: {}", e);
                match &last_glucose {
                    Some(line) => format!("{} (stale)", line),
                    None => "readings unavailable".to_string(),
                }
            }
        };
        println!("[{}] {} | {}", local_time(now, &offset), glucose, insulin);

        polls += 1;
        if iterations.is_some_and(|n| polls >= n) {
            break;
        }
        std::thread::sleep(std::time::Duration::from_secs(interval_secs));
    }

    Ok(())
}

/// IOB/COB part of a watch line
enum InsulinLine {
    Fresh((f64, f64)),
    Stale((f64, f64)),
    Unavailable,
}

impl std::fmt::Display for InsulinLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsulinLine::Fresh((iob, cob)) => write!(f, "IOB {:.2} U | COB {:.1} g", iob, cob),
            InsulinLine::Stale((iob, cob)) => {
                write!(f, "IOB {:.2} U | COB {:.1} g (stale)", iob, cob)
            }
            InsulinLine::Unavailable => write!(f, "IOB -- | COB --"),
        }
    }
}

fn glucose_line(readings: &[GlucoseReading]) -> String {
    match (readings.last(), bucketed_delta(readings)) {
        (Some(latest), Some(delta)) => format!(
            "{} mg/dL {} {:+.1}",
            latest.value,
            delta.direction.arrow(),
            delta.mgdl
        ),
        (Some(latest), None) => format!("{} mg/dL", latest.value),
        (None, _) => "no recent readings".to_string(),
    }
}

fn local_time(at: DateTime<Utc>, offset: &FixedOffset) -> String {
    at.with_timezone(offset).format("%Y-%m-%d %H:%M").to_string()
}

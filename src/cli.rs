//! Command-line interface for apexscan.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::apex::is_apex_extension;
use crate::config::{self, Config};
use crate::detect::{AntipatternRegistry, Scanner, SourceUnit};
use crate::report::{self, Format};
use crate::telemetry::{
    OrgConnection, TelemetryClient, TelemetryFetch, TelemetryRequest, TelemetryStatus,
};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FINDINGS: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Apex antipattern scanner with runtime-correlated severity.
///
/// Finds uncached global describes, unbounded SOQL and over-fetching
/// queries. When an org connection is available, severities are
/// recalibrated from production execution telemetry.
#[derive(Parser)]
#[command(name = "apexscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan an Apex class, trigger or directory
    Scan(ScanArgs),
    /// Write a default apexscan.yaml
    Init(InitArgs),
}

/// Arguments for the scan command.
#[derive(Parser)]
pub struct ScanArgs {
    /// Path to scan (.cls/.trigger file or directory)
    pub path: PathBuf,

    /// Unit name to report for a single file (default: file stem)
    #[arg(long)]
    pub class_name: Option<String>,

    /// Output format: pretty, json, or sarif
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Org instance URL, e.g. https://acme.my.salesforce.com
    #[arg(long, env = "APEXSCAN_INSTANCE_URL")]
    pub instance_url: Option<String>,

    /// OAuth access token for the org
    #[arg(long, env = "APEXSCAN_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Org id sent with telemetry requests
    #[arg(long, env = "APEXSCAN_ORG_ID")]
    pub org_id: Option<String>,

    /// User id used for the request correlation id
    #[arg(long, env = "APEXSCAN_USER_ID")]
    pub user_id: Option<String>,

    /// REST API version (default: from config)
    #[arg(long, env = "APEXSCAN_API_VERSION")]
    pub api_version: Option<String>,

    /// Skip runtime telemetry, static analysis only
    #[arg(long)]
    pub offline: bool,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "apexscan.yaml")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Check that a path names something scannable.
///
/// Files must carry an Apex extension; directories are accepted as is.
pub fn validate_path(path: &Path) -> anyhow::Result<()> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("file does not exist: {}", path.display()))?;

    if metadata.is_file() {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !is_apex_extension(ext) {
            anyhow::bail!(
                "invalid file type: only Apex files (.cls or .trigger) can be scanned, got {}",
                path.display()
            );
        }
    }
    Ok(())
}

/// Collect Apex files under `root`, skipping hidden directories and
/// excluded paths. Sorted for stable output.
pub fn collect_files(root: &Path, config: &Config) -> anyhow::Result<Vec<PathBuf>> {
    let excluded = config.excluded_set();
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            // Skip hidden directories
            if e.depth() > 0 && e.file_type().is_dir() && name.starts_with('.') {
                return false;
            }
            !(e.file_type().is_dir() && name == "node_modules")
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !is_apex_extension(ext) {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if excluded.is_match(relative) || excluded.is_match(path) {
            debug!(path = %path.display(), "excluded by config");
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Read files into scan units.
pub fn load_units(files: &[PathBuf], class_name: Option<&str>) -> anyhow::Result<Vec<SourceUnit>> {
    files
        .iter()
        .map(|path| {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("error reading file '{}'", path.display()))?;
            let name = match class_name {
                Some(name) if files.len() == 1 => name.to_string(),
                _ => SourceUnit::name_from_path(path),
            };
            Ok(SourceUnit::new(name, path.clone(), source))
        })
        .collect()
}

/// Org connection from flags and environment, if complete.
///
/// The org and user ids identify the request, so a connection without
/// them is treated as no connection at all.
pub fn connection_from_args(args: &ScanArgs, config: &Config) -> Option<OrgConnection> {
    let has_id = |id: &Option<String>| id.as_deref().is_some_and(|v| !v.trim().is_empty());
    if !has_id(&args.org_id) || !has_id(&args.user_id) {
        debug!("org id or user id missing, telemetry disabled");
        return None;
    }

    let instance_url = args.instance_url.as_deref()?.trim();
    let access_token = args.access_token.as_deref()?.trim();
    let api_version = args
        .api_version
        .clone()
        .unwrap_or_else(|| config.telemetry.api_version.clone());

    let connection = OrgConnection::new(instance_url, access_token, api_version);
    connection.is_usable().then_some(connection)
}

/// Fetch telemetry for every unit in one request.
fn fetch_telemetry(
    args: &ScanArgs,
    config: &Config,
    units: &[SourceUnit],
) -> anyhow::Result<TelemetryFetch> {
    let request = TelemetryRequest::new(
        args.org_id.as_deref().unwrap_or_default().trim(),
        args.user_id.as_deref().unwrap_or_default().trim(),
        units.iter().map(|u| u.name.clone()).collect(),
    );

    if args.offline {
        debug!("offline mode, skipping telemetry");
        return Ok(TelemetryFetch::not_attempted(
            TelemetryStatus::NoConnection,
            request.correlation_id,
            None,
        ));
    }

    let connection = connection_from_args(args, config);
    let client = match TelemetryClient::new(config.telemetry.clone()) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "could not create telemetry client");
            return Ok(TelemetryFetch::not_attempted(
                TelemetryStatus::ApiError,
                request.correlation_id,
                Some(e.to_string()),
            ));
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;
    Ok(runtime.block_on(client.fetch_runtime_data(connection.as_ref(), &request)))
}

/// Run the scan command.
pub fn run_scan(args: &ScanArgs) -> anyhow::Result<i32> {
    let format: Format = match args.format.parse() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let cwd = std::env::current_dir()?;
    let (config, config_path) = match Config::load(args.config.as_deref(), &cwd) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if let Some(path) = &config_path {
        debug!(config = %path.display(), "loaded config");
    }

    if let Err(e) = validate_path(&args.path) {
        eprintln!("Error: {:#}", e);
        return Ok(EXIT_ERROR);
    }
    let abs_path = args
        .path
        .canonicalize()
        .with_context(|| format!("cannot access path {}", args.path.display()))?;

    let files = if abs_path.is_dir() {
        collect_files(&abs_path, &config)?
    } else {
        vec![abs_path.clone()]
    };
    if files.is_empty() {
        eprintln!("Warning: no Apex files to scan");
        return Ok(EXIT_SUCCESS);
    }

    let units = load_units(&files, args.class_name.as_deref())?;
    info!(units = units.len(), "scanning");

    let telemetry = fetch_telemetry(args, &config, &units)?;
    let scanner = Scanner::new(AntipatternRegistry::with_builtins(&config.thresholds));
    let scans = scanner.run_batch(&units, Some(&telemetry));

    let path_str = args.path.to_string_lossy().to_string();
    let config_str = config_path.map(|p| p.to_string_lossy().to_string());
    match format {
        Format::Json => report::write_json(&path_str, config_str.as_deref(), &scans, &telemetry)?,
        Format::Sarif => {
            let base = if abs_path.is_dir() {
                abs_path.as_path()
            } else {
                abs_path.parent().unwrap_or(abs_path.as_path())
            };
            report::write_sarif(base, &scans)?
        }
        Format::Pretty => {
            report::write_pretty(&path_str, config_str.as_deref(), &scans, &telemetry)
        }
    }

    if scans.iter().any(|s| !s.result.is_empty()) {
        Ok(EXIT_FINDINGS)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.output.exists() && !args.force {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or pass --force to overwrite");
        return Ok(EXIT_ERROR);
    }

    // Create output directory if needed
    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }

    std::fs::write(&args.output, config::DEFAULT_TEMPLATE)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Tune the thresholds in {} for your org", args.output.display());
    println!("  2. Run: apexscan scan force-app --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scan_args(path: PathBuf) -> ScanArgs {
        ScanArgs {
            path,
            class_name: None,
            format: "json".into(),
            config: None,
            instance_url: None,
            access_token: None,
            org_id: None,
            user_id: None,
            api_version: None,
            offline: true,
        }
    }

    #[test]
    fn test_validate_path() {
        let temp = TempDir::new().unwrap();
        let cls = temp.path().join("A.cls");
        let java = temp.path().join("A.java");
        std::fs::write(&cls, "public class A {}").unwrap();
        std::fs::write(&java, "class A {}").unwrap();

        assert!(validate_path(&cls).is_ok());
        assert!(validate_path(temp.path()).is_ok());

        let err = validate_path(&java).unwrap_err().to_string();
        assert!(err.contains("invalid file type"));
        let err = validate_path(&temp.path().join("Missing.cls"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn test_collect_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("classes")).unwrap();
        std::fs::create_dir_all(root.join("triggers")).unwrap();
        std::fs::create_dir_all(root.join(".sfdx/tools")).unwrap();
        std::fs::create_dir_all(root.join("legacy")).unwrap();
        std::fs::write(root.join("classes/B.cls"), "").unwrap();
        std::fs::write(root.join("classes/A.cls"), "").unwrap();
        std::fs::write(root.join("classes/A.cls-meta.xml"), "").unwrap();
        std::fs::write(root.join("triggers/T.trigger"), "").unwrap();
        std::fs::write(root.join(".sfdx/tools/Hidden.cls"), "").unwrap();
        std::fs::write(root.join("legacy/Old.cls"), "").unwrap();

        let config = Config {
            excluded_paths: vec!["legacy/**".into()],
            ..Config::default()
        };
        let files = collect_files(root, &config).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["classes/A.cls", "classes/B.cls", "triggers/T.trigger"]);
    }

    #[test]
    fn test_load_units_class_name_override() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("accountService.cls");
        std::fs::write(&file, "public class AccountService {}").unwrap();

        let units = load_units(&[file.clone()], Some("AccountService")).unwrap();
        assert_eq!(units[0].name, "AccountService");
        let units = load_units(&[file], None).unwrap();
        assert_eq!(units[0].name, "accountService");
    }

    #[test]
    fn test_connection_requires_url_and_token() {
        let config = Config::default();
        let mut args = scan_args(PathBuf::from("."));
        args.org_id = Some("00Dxx0000001".into());
        args.user_id = Some("005xx0000001".into());
        assert!(connection_from_args(&args, &config).is_none());

        args.instance_url = Some("https://acme.my.salesforce.com".into());
        assert!(connection_from_args(&args, &config).is_none());

        args.access_token = Some("token".into());
        let conn = connection_from_args(&args, &config).unwrap();
        assert_eq!(conn.api_version, "62.0");

        args.api_version = Some("60.0".into());
        assert_eq!(connection_from_args(&args, &config).unwrap().api_version, "60.0");
    }

    #[test]
    fn test_connection_requires_org_and_user_ids() {
        let config = Config::default();
        let mut args = scan_args(PathBuf::from("."));
        args.instance_url = Some("https://acme.my.salesforce.com".into());
        args.access_token = Some("token".into());
        assert!(connection_from_args(&args, &config).is_none());

        args.org_id = Some("00Dxx0000001".into());
        assert!(connection_from_args(&args, &config).is_none());

        args.user_id = Some("  ".into());
        assert!(connection_from_args(&args, &config).is_none());

        args.user_id = Some("005xx0000001".into());
        assert!(connection_from_args(&args, &config).is_some());
    }

    #[test]
    fn test_missing_ids_fetch_makes_no_call() {
        let mut args = scan_args(PathBuf::from("."));
        args.offline = false;
        args.instance_url = Some("https://acme.my.salesforce.com".into());
        args.access_token = Some("token".into());

        let units = vec![SourceUnit::new("A", "A.cls", "public class A {}")];
        let fetch = fetch_telemetry(&args, &Config::default(), &units).unwrap();
        assert_eq!(fetch.status, TelemetryStatus::NoConnection);
        assert_eq!(fetch.attempts, 0);
        assert!(fetch.report.is_none());
    }

    #[test]
    fn test_offline_fetch_makes_no_call() {
        let args = scan_args(PathBuf::from("."));
        let units = vec![SourceUnit::new("A", "A.cls", "public class A {}")];
        let fetch = fetch_telemetry(&args, &Config::default(), &units).unwrap();
        assert_eq!(fetch.status, TelemetryStatus::NoConnection);
        assert_eq!(fetch.attempts, 0);
    }

    #[test]
    fn test_scan_exit_codes() {
        let temp = TempDir::new().unwrap();
        let dirty = temp.path().join("Dirty.cls");
        let clean = temp.path().join("Clean.cls");
        std::fs::write(
            &dirty,
            "public class Dirty { void m() { List<Account> a = [SELECT Id FROM Account]; update a; } }",
        )
        .unwrap();
        std::fs::write(&clean, "public class Clean { Integer n() { return 1; } }").unwrap();

        let mut args = scan_args(dirty);
        args.config = Some(temp.path().join("missing.yaml"));
        assert_eq!(run_scan(&args).unwrap(), EXIT_ERROR);

        args.config = None;
        assert_eq!(run_scan(&args).unwrap(), EXIT_FINDINGS);

        args.path = clean;
        assert_eq!(run_scan(&args).unwrap(), EXIT_SUCCESS);

        args.format = "xml".into();
        assert_eq!(run_scan(&args).unwrap(), EXIT_ERROR);

        args.format = "json".into();
        args.path = temp.path().join("Nope.cls");
        assert_eq!(run_scan(&args).unwrap(), EXIT_ERROR);
    }

    #[test]
    fn test_init_writes_template() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("nested/apexscan.yaml");
        let args = InitArgs {
            output: output.clone(),
            force: false,
        };
        assert_eq!(run_init(&args).unwrap(), EXIT_SUCCESS);
        assert!(Config::parse_file(&output).is_ok());
        assert_eq!(run_init(&args).unwrap(), EXIT_ERROR);

        let forced = InitArgs {
            output,
            force: true,
        };
        assert_eq!(run_init(&forced).unwrap(), EXIT_SUCCESS);
    }
}

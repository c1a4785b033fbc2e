use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::coverage::CoverageGranularity;

/// Main configuration structure for covsynth
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Aggregate (and per-unit) coverage percentage to reach, in (0, 100]
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Iteration budgets and worker pool size
    #[serde(default)]
    pub iteration: IterationConfig,

    /// Backoff applied between retryable generation failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Outbound rate limit for the generation backend
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Generation backend settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Build/execute toolchain and coverage tool
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Source and test tree layout
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Disallowed-effect checks applied during validation
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Which source units a run targets
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_threshold() -> f64 {
    80.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            iteration: IterationConfig::default(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            generation: GenerationConfig::default(),
            toolchain: ToolchainConfig::default(),
            layout: LayoutConfig::default(),
            sandbox: SandboxConfig::default(),
            detection: DetectionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Iteration budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IterationConfig {
    /// Generation attempts allowed per unit
    #[serde(default = "default_max_attempts_per_unit")]
    pub max_attempts_per_unit: u32,

    /// Consecutive failures after which a unit is exhausted
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Generation attempts allowed across the whole run
    #[serde(default = "default_max_total_iterations")]
    pub max_total_iterations: u32,

    /// Wall-clock budget for the whole run in seconds
    #[serde(default = "default_max_wall_time_secs")]
    pub max_wall_time_secs: u64,

    /// Consecutive auth/invalid-response errors that abort the run
    #[serde(default = "default_fatal_error_threshold")]
    pub fatal_error_threshold: u32,

    /// Units generated and validated in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Artifacts shorter than this are treated as invalid responses
    #[serde(default = "default_min_artifact_chars")]
    pub min_artifact_chars: usize,
}

const fn default_max_attempts_per_unit() -> u32 {
    6
}

const fn default_max_consecutive_failures() -> u32 {
    3
}

const fn default_max_total_iterations() -> u32 {
    50
}

const fn default_max_wall_time_secs() -> u64 {
    1800
}

const fn default_fatal_error_threshold() -> u32 {
    3
}

const fn default_concurrency() -> usize {
    4
}

const fn default_min_artifact_chars() -> usize {
    80
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_unit: default_max_attempts_per_unit(),
            max_consecutive_failures: default_max_consecutive_failures(),
            max_total_iterations: default_max_total_iterations(),
            max_wall_time_secs: default_max_wall_time_secs(),
            fatal_error_threshold: default_fatal_error_threshold(),
            concurrency: default_concurrency(),
            min_artifact_chars: default_min_artifact_chars(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_initial_backoff_ms() -> u64 {
    2000
}

const fn default_max_backoff_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests per second allowed
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Burst size for token bucket
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

const fn default_requests_per_second() -> f64 {
    0.5
}

const fn default_burst_size() -> u32 {
    2
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

/// Generation backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    /// Anthropic-compatible Messages API
    #[default]
    Anthropic,
    /// Scripted backend for dry runs
    Mock,
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GenerationConfig {
    #[serde(default)]
    pub backend: GenerationBackend,

    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model requested from the backend
    #[serde(default = "default_model")]
    pub model: String,

    /// API key; falls back to `ANTHROPIC_API_KEY`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// API version header
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,

    /// Max tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Optional prompt guide; its system section replaces the built-in prompt
    #[serde(default)]
    pub guide_path: Option<PathBuf>,

    /// Recorded in candidate provenance
    #[serde(default = "default_prompt_revision")]
    pub prompt_revision: String,

    /// Language and framework named in the prompt
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_framework")]
    pub framework: String,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

const fn default_generation_timeout_secs() -> u64 {
    120
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_temperature() -> f32 {
    0.2
}

fn default_prompt_revision() -> String {
    "v1".to_string()
}

fn default_language() -> String {
    "Java".to_string()
}

fn default_framework() -> String {
    "JUnit 5 + Mockito".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: GenerationBackend::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            api_version: default_api_version(),
            timeout_secs: default_generation_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            guide_path: None,
            prompt_revision: default_prompt_revision(),
            language: default_language(),
            framework: default_framework(),
        }
    }
}

/// Coverage report format produced by the suite command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Jacoco,
    Lcov,
}

/// Toolchain configuration.
///
/// Commands are argv vectors, never shell strings. They may contain the
/// placeholders `{candidate}`, `{workdir}`, `{class}`, `{classpath}`,
/// `{source_root}` and `{test_root}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ToolchainConfig {
    /// Project directory all commands run in
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Classpath of the compiled sources and their dependencies
    #[serde(default = "default_classpath")]
    pub classpath: String,

    /// Compiles one candidate in isolation
    #[serde(default = "default_compile_command")]
    pub compile_command: Vec<String>,

    /// Runs one compiled candidate; empty means compile-only validation
    #[serde(default = "default_run_command")]
    pub run_command: Vec<String>,

    /// Runs the whole accepted suite and writes the coverage report
    #[serde(default = "default_suite_command")]
    pub suite_command: Vec<String>,

    /// Explicit report path, relative to `working_dir`
    #[serde(default)]
    pub report_path: Option<PathBuf>,

    /// Glob used to find the report when `report_path` is unset
    #[serde(default = "default_report_glob")]
    pub report_glob: String,

    #[serde(default)]
    pub report_format: ReportFormat,

    #[serde(default)]
    pub granularity: CoverageGranularity,

    #[serde(default = "default_validation_timeout_secs")]
    pub validation_timeout_secs: u64,

    #[serde(default = "default_measurement_timeout_secs")]
    pub measurement_timeout_secs: u64,

    /// Diagnostics fragments that identify unresolved symbols
    #[serde(default = "default_unresolved_symbol_markers")]
    pub unresolved_symbol_markers: Vec<String>,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_classpath() -> String {
    "target/classes:target/dependency/*".to_string()
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

fn default_compile_command() -> Vec<String> {
    argv(&["javac", "-d", "{workdir}/classes", "-cp", "{classpath}", "{candidate}"])
}

fn default_run_command() -> Vec<String> {
    argv(&[
        "java",
        "-jar",
        "lib/junit-platform-console-standalone.jar",
        "--class-path",
        "{workdir}/classes:{classpath}",
        "--select-class",
        "{class}",
    ])
}

fn default_suite_command() -> Vec<String> {
    argv(&["mvn", "-q", "-DskipTests=false", "test", "jacoco:report"])
}

fn default_report_glob() -> String {
    "**/target/site/jacoco*/jacoco.xml".to_string()
}

const fn default_validation_timeout_secs() -> u64 {
    300
}

const fn default_measurement_timeout_secs() -> u64 {
    900
}

fn default_unresolved_symbol_markers() -> Vec<String> {
    argv(&[
        "cannot find symbol",
        "does not exist",
        "unresolved import",
        "cannot find value",
        "cannot find type",
    ])
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            classpath: default_classpath(),
            compile_command: default_compile_command(),
            run_command: default_run_command(),
            suite_command: default_suite_command(),
            report_path: None,
            report_glob: default_report_glob(),
            report_format: ReportFormat::default(),
            granularity: CoverageGranularity::default(),
            validation_timeout_secs: default_validation_timeout_secs(),
            measurement_timeout_secs: default_measurement_timeout_secs(),
            unresolved_symbol_markers: default_unresolved_symbol_markers(),
        }
    }
}

/// Source/test tree layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LayoutConfig {
    /// Root of production sources, relative to the working dir
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,

    /// Root where accepted tests are written
    #[serde(default = "default_test_root")]
    pub test_root: PathBuf,

    /// Source file extension without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Appended to the source stem to name a test class
    #[serde(default = "default_test_suffix")]
    pub test_suffix: String,

    /// Where the acceptance manifest lives
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_source_root() -> PathBuf {
    PathBuf::from("src/main/java")
}

fn default_test_root() -> PathBuf {
    PathBuf::from("src/test/java")
}

fn default_extension() -> String {
    "java".to_string()
}

fn default_test_suffix() -> String {
    "Test".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".covsynth")
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            test_root: default_test_root(),
            extension: default_extension(),
            test_suffix: default_test_suffix(),
            state_dir: default_state_dir(),
        }
    }
}

/// Disallowed-effect patterns checked by the validator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SandboxConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Source fragments that indicate real network access
    #[serde(default = "default_network_patterns")]
    pub network_patterns: Vec<String>,

    /// Source fragments that indicate real filesystem writes
    #[serde(default = "default_filesystem_patterns")]
    pub filesystem_patterns: Vec<String>,

    /// Source fragments that indicate real time-dependent sleeps
    #[serde(default = "default_sleep_patterns")]
    pub sleep_patterns: Vec<String>,

    /// Execution output fragments that reveal a disallowed effect at runtime
    #[serde(default = "default_output_markers")]
    pub output_markers: Vec<String>,
}

const fn default_true() -> bool {
    true
}

fn default_network_patterns() -> Vec<String> {
    argv(&[
        "java.net.Socket",
        "java.net.URL",
        "HttpURLConnection",
        "HttpClient",
        "RestTemplate",
        "WebClient",
        "SpringApplication.run",
    ])
}

fn default_filesystem_patterns() -> Vec<String> {
    argv(&[
        "FileOutputStream",
        "FileWriter",
        "Files.write",
        "Files.delete",
        "Files.createFile",
        "RandomAccessFile",
    ])
}

fn default_sleep_patterns() -> Vec<String> {
    argv(&["Thread.sleep", "TimeUnit.SECONDS.sleep", "TimeUnit.MILLISECONDS.sleep"])
}

fn default_output_markers() -> Vec<String> {
    argv(&[
        "java.net.ConnectException",
        "java.net.UnknownHostException",
        "java.nio.file.AccessDeniedException",
    ])
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            network_patterns: default_network_patterns(),
            filesystem_patterns: default_filesystem_patterns(),
            sleep_patterns: default_sleep_patterns(),
            output_markers: default_output_markers(),
        }
    }
}

/// How the initial set of units is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Files touched by `base..head`
    #[default]
    Changed,
    /// Every file under the source root
    All,
}

/// Change detection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DetectionConfig {
    #[serde(default)]
    pub mode: DetectionMode,

    /// Base commit; falls back to `BASE_SHA` / `GITHUB_BASE_SHA`
    #[serde(default)]
    pub base_sha: Option<String>,

    /// Head commit; falls back to `HEAD_SHA` / `GITHUB_SHA`
    #[serde(default)]
    pub head_sha: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated JSON log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

use std::{env, error::Error, fs, path::Path};

use serde::Deserialize;

const CONFIG_FILE: &str = "cfg.toml";
const EXAMPLE_CONFIG_FILE: &str = "cfg.toml.example";

fn default_policy() -> String {
    "halt".to_string()
}

fn default_diagnostics() -> bool {
    false
}

#[derive(Deserialize)]
struct RawConfig {
    apn: Option<String>,
    mqtt_hostname: String,
    mqtt_port: u16,
    mqtt_client_id: String,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_keepalive_seconds: u16,
    tls_root_ca: String,
    tls_client_cert: String,
    tls_client_key: String,
    tls_root_only: bool,
    chunk_size: u16,
    jpeg_quality: u8,
    confidence_threshold: f32,
    classification_timeout_seconds: u32,
    idle_timeout_seconds: u32,
    cooldown_seconds: u32,
    command_timeout_seconds: u32,
    modem_probe_attempts: u16,
    #[serde(default = "default_diagnostics")]
    diagnostics: bool,
    #[serde(default = "default_policy")]
    publish_failure_policy: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Tell Cargo to rerun if toml changes
    println!("cargo:rerun-if-changed={}", CONFIG_FILE);
    println!("cargo:rerun-if-changed={}", EXAMPLE_CONFIG_FILE);

    // Secrets live in the git-ignored cfg.toml, fall back to the template
    let path = if Path::new(CONFIG_FILE).exists() {
        CONFIG_FILE
    } else {
        println!(
            "cargo:warning={} not found, building with {}",
            CONFIG_FILE, EXAMPLE_CONFIG_FILE
        );
        EXAMPLE_CONFIG_FILE
    };

    // Read and parse
    let toml_str = fs::read_to_string(path)?;
    let raw: RawConfig = toml::from_str(&toml_str)?;

    let policy = match raw.publish_failure_policy.as_str() {
        "halt" => "FailurePolicy::Halt",
        "continue" => "FailurePolicy::Continue",
        other => {
            return Err(format!(
                "publish_failure_policy must be \"halt\" or \"continue\", got {:?}",
                other
            )
            .into())
        }
    };

    // Generate Rust code
    let out_dir = env::var("OUT_DIR")?;
    let dest_path = Path::new(&out_dir).join("config.rs");
    let code = format!(
        r#"
        pub const CONFIG: Config = Config {{
            apn: {apn:?},
            mqtt_hostname: {mh:?},
            mqtt_port: {mp},
            mqtt_client_id: {mc:?},
            mqtt_topic: {mt:?},
            mqtt_username: {mu:?},
            mqtt_password: {mpw:?},
            mqtt_keepalive_seconds: {mk},
            tls_root_ca: {ca:?},
            tls_client_cert: {cert:?},
            tls_client_key: {key:?},
            tls_root_only: {root_only},
            chunk_size: {chunk},
            jpeg_quality: {quality},
            confidence_threshold: {threshold:?},
            classification_timeout_seconds: {classify},
            idle_timeout_seconds: {idle},
            cooldown_seconds: {cooldown},
            command_timeout_seconds: {command},
            modem_probe_attempts: {probe},
            diagnostics: {diagnostics},
            publish_failure_policy: {policy},
        }};
    "#,
        apn = raw.apn,
        mh = raw.mqtt_hostname,
        mp = raw.mqtt_port,
        mc = raw.mqtt_client_id,
        mt = raw.mqtt_topic,
        mu = raw.mqtt_username,
        mpw = raw.mqtt_password,
        mk = raw.mqtt_keepalive_seconds,
        ca = raw.tls_root_ca,
        cert = raw.tls_client_cert,
        key = raw.tls_client_key,
        root_only = raw.tls_root_only,
        chunk = raw.chunk_size,
        quality = raw.jpeg_quality,
        threshold = raw.confidence_threshold,
        classify = raw.classification_timeout_seconds,
        idle = raw.idle_timeout_seconds,
        cooldown = raw.cooldown_seconds,
        command = raw.command_timeout_seconds,
        probe = raw.modem_probe_attempts,
        diagnostics = raw.diagnostics,
        policy = policy,
    );

    fs::write(dest_path, code)?;
    Ok(())
}

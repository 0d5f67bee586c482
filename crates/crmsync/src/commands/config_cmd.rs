//! Config subcommand handlers.

use std::fmt::Write as _;

use dialoguer::{Input, Select};
use secrecy::{ExposeSecret, SecretString};

use crmsync_config::{
    self as store, Config, Profile, config_path, load_config_or_default, save_config, store_token,
};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{active_profile_name, available_profiles};
use crate::error::CliError;
use crate::output;

const MASK: &str = "********";

// ── Helpers ─────────────────────────────────────────────────────────

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Prompt(e.to_string())
}

/// Copy of `cfg` with every plaintext token masked.
fn redacted(cfg: &Config) -> Config {
    Config {
        default_profile: cfg.default_profile.clone(),
        defaults: cfg.defaults.clone(),
        profiles: cfg
            .profiles
            .iter()
            .map(|(name, profile)| {
                let mut profile = profile.clone();
                if profile.token.is_some() {
                    profile.token = Some(MASK.into());
                }
                (name.clone(), profile)
            })
            .collect(),
    }
}

/// Redacted config as TOML, profiles sorted by name.
fn format_config(cfg: &Config) -> String {
    let mut out = String::new();
    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let d = &cfg.defaults;
    let _ = writeln!(out, "timeout = {}", d.timeout);
    let _ = writeln!(out, "heartbeat_secs = {}", d.heartbeat_secs);
    let _ = writeln!(out, "reconnect_initial_ms = {}", d.reconnect_initial_ms);
    let _ = writeln!(out, "reconnect_max_secs = {}", d.reconnect_max_secs);
    if let Some(max) = d.max_retries {
        let _ = writeln!(out, "max_retries = {max}");
    }
    let _ = writeln!(out, "activity_capacity = {}", d.activity_capacity);

    let mut names: Vec<&String> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let Some(p) = cfg.profiles.get(name) else {
            continue;
        };
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "endpoint = \"{}\"", p.endpoint);
        if p.token.is_some() {
            let _ = writeln!(out, "token = \"{MASK}\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        let numbers = [
            ("timeout", p.timeout),
            ("heartbeat_secs", p.heartbeat_secs),
            ("reconnect_initial_ms", p.reconnect_initial_ms),
            ("reconnect_max_secs", p.reconnect_max_secs),
            ("max_retries", p.max_retries.map(u64::from)),
        ];
        for (key, value) in numbers {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = {value}");
            }
        }
        if let Some(capacity) = p.activity_capacity {
            let _ = writeln!(out, "activity_capacity = {capacity}");
        }
    }
    out
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("'{value}' is not a valid number"),
    })
}

/// Apply one `config set` assignment to `profile`.
fn set_key(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key {
        "endpoint" => profile.endpoint = value,
        "token_env" | "token-env" => profile.token_env = Some(value),
        "timeout" => profile.timeout = Some(parse_number(key, &value)?),
        "heartbeat_secs" | "heartbeat-secs" => {
            profile.heartbeat_secs = Some(parse_number(key, &value)?);
        }
        "reconnect_initial_ms" | "reconnect-initial-ms" => {
            profile.reconnect_initial_ms = Some(parse_number(key, &value)?);
        }
        "reconnect_max_secs" | "reconnect-max-secs" => {
            profile.reconnect_max_secs = Some(parse_number(key, &value)?);
        }
        "max_retries" | "max-retries" => profile.max_retries = Some(parse_number(key, &value)?),
        "activity_capacity" | "activity-capacity" => {
            profile.activity_capacity = Some(parse_number(key, &value)?);
        }
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: endpoint, token_env, timeout, \
                     heartbeat_secs, reconnect_initial_ms, reconnect_max_secs, max_retries, \
                     activity_capacity"
                ),
            });
        }
    }
    Ok(())
}

fn prompt_token() -> Result<SecretString, CliError> {
    let token = rpassword::prompt_password("Token: ").map_err(prompt_err)?;
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(SecretString::from(token))
}

// ── Subcommands ─────────────────────────────────────────────────────

fn init() -> Result<(), CliError> {
    let path = config_path();
    eprintln!("crmsync configuration wizard");
    eprintln!("   Config path: {}\n", path.display());

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let endpoint: String = Input::new()
        .with_prompt("WebSocket endpoint")
        .default("wss://crm.example.com/ws".into())
        .interact_text()
        .map_err(prompt_err)?;

    let mut profile = Profile::new(endpoint);
    let mut cfg = load_config_or_default();
    // Reject a bad endpoint before anything is written
    store::profile_to_sync_config(&profile, &cfg.defaults)?;

    let token = prompt_token()?;
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the token?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        store_token(&profile_name, &token)?;
        eprintln!("   Token stored in system keyring");
    } else {
        profile.token = Some(token.expose_secret().to_owned());
    }

    cfg.profiles.insert(profile_name.clone(), profile);
    cfg.default_profile = Some(profile_name.clone());
    let written = save_config(&cfg)?;

    eprintln!("\nConfiguration written to {}", written.display());
    eprintln!("  Active profile: {profile_name}");
    eprintln!("\n  Test it: crmsync status");
    Ok(())
}

fn show(global: &GlobalOpts) {
    let cfg = redacted(&load_config_or_default());
    let out = output::render_record(&global.output, &cfg, format_config);
    output::print_output(&out, global.quiet);
}

fn set(global: &GlobalOpts, key: &str, value: String) -> Result<(), CliError> {
    let mut cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let profile = cfg.profiles.entry(profile_name.clone()).or_default();
    set_key(profile, key, value)?;

    save_config(&cfg)?;
    eprintln!("Set {key} on profile '{profile_name}'");
    Ok(())
}

fn use_profile(name: String) -> Result<(), CliError> {
    let mut cfg = load_config_or_default();
    if !cfg.profiles.contains_key(&name) {
        return Err(CliError::ProfileNotFound {
            name,
            available: available_profiles(&cfg),
        });
    }
    cfg.default_profile = Some(name.clone());
    save_config(&cfg)?;
    eprintln!("Default profile set to '{name}'");
    Ok(())
}

fn set_token(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);
    if !cfg.profiles.contains_key(&profile_name) {
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(&cfg),
        });
    }

    let token = prompt_token()?;
    store_token(&profile_name, &token)?;
    eprintln!("Token stored in system keyring for profile '{profile_name}'");
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(),
        ConfigCommand::Show => {
            show(global);
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", config_path().display());
            Ok(())
        }
        ConfigCommand::Set { key, value } => set(global, &key, value),
        ConfigCommand::Use { name } => use_profile(name),
        ConfigCommand::SetToken => set_token(global),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Config {
        let mut cfg = Config::default();
        let mut prod = Profile::new("wss://crm.example.com/ws");
        prod.token = Some("hunter2".into());
        prod.max_retries = Some(5);
        cfg.profiles.insert("prod".into(), prod);
        cfg.profiles
            .insert("local".into(), Profile::new("ws://localhost:4000/ws"));
        cfg
    }

    #[test]
    fn show_masks_tokens() {
        let cfg = redacted(&sample());
        let text = format_config(&cfg);
        assert!(!text.contains("hunter2"));
        assert!(text.contains("token = \"********\""));
        assert!(text.contains("max_retries = 5"));

        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn show_lists_profiles_in_name_order() {
        let text = format_config(&sample());
        let local = text.find("[profiles.local]").unwrap();
        let prod = text.find("[profiles.prod]").unwrap();
        assert!(local < prod);
    }

    #[test]
    fn set_key_parses_numbers() {
        let mut profile = Profile::default();
        set_key(&mut profile, "heartbeat-secs", "15".into()).unwrap();
        set_key(&mut profile, "max_retries", "3".into()).unwrap();
        set_key(&mut profile, "endpoint", "wss://x/ws".into()).unwrap();
        assert_eq!(profile.heartbeat_secs, Some(15));
        assert_eq!(profile.max_retries, Some(3));
        assert_eq!(profile.endpoint, "wss://x/ws");
    }

    #[test]
    fn set_key_rejects_bad_input() {
        let mut profile = Profile::default();
        let err = set_key(&mut profile, "timeout", "soon".into()).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "timeout"));

        let err = set_key(&mut profile, "colour", "red".into()).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "colour"));
    }
}

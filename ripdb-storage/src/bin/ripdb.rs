/// RipDB operator CLI - inspect and manage tiered records
///
/// Usage: ripdb <get|set|purge|backup> <key> [json-value]
///
/// Configuration is read from `RIPDB_*` environment variables. Logs go to
/// stderr (JSON when `RIPDB_LOG_JSON` is set); results go to stdout.

use ripdb_core::{encode_envelope, RipConfig, RipResult};
use ripdb_storage::{connect, DynTier};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, PartialEq)]
enum Command {
    Get { key: String },
    Set { key: String, value: Value },
    Purge { key: String },
    Backup { key: String },
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let (command, rest) = args
        .split_first()
        .ok_or_else(|| "missing command".to_string())?;
    let key = rest
        .first()
        .cloned()
        .ok_or_else(|| format!("{} requires a key", command))?;

    match (command.as_str(), rest.len()) {
        ("get", 1) => Ok(Command::Get { key }),
        ("purge", 1) => Ok(Command::Purge { key }),
        ("backup", 1) => Ok(Command::Backup { key }),
        ("set", 2) => {
            let value = serde_json::from_str(&rest[1])
                .map_err(|e| format!("value is not valid JSON: {}", e))?;
            Ok(Command::Set { key, value })
        }
        ("get" | "purge" | "backup" | "set", _) => {
            Err(format!("wrong number of arguments for {}", command))
        }
        (other, _) => Err(format!("unknown command: {}", other)),
    }
}

fn init_tracing() {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ripdb=info,ripdb_storage=info,warn"))
    };

    if std::env::var_os("RIPDB_LOG_JSON").is_some() {
        tracing_subscriber::registry()
            .with(filter())
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter())
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Run one command, returning the text to print.
async fn run(tier: &DynTier, command: Command) -> RipResult<Option<String>> {
    match command {
        Command::Get { key } => match tier.get::<Value>(&key).await? {
            Some(envelope) => Ok(Some(encode_envelope(&envelope)?)),
            None => Ok(None),
        },
        Command::Set { key, value } => {
            tier.set(&key, value).await?;
            // Let the background upload finish so the printed record shows it.
            tier.drain().await;
            match tier.peek::<Value>(&key).await? {
                Some(envelope) => Ok(Some(encode_envelope(&envelope)?)),
                None => Ok(None),
            }
        }
        Command::Purge { key } => {
            tier.purge(&key).await?;
            Ok(Some(format!("purged {}", key)))
        }
        Command::Backup { key } => {
            let outcome = tier.backup_now(&key).await?;
            Ok(Some(format!("{:?}", outcome)))
        }
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("error: {}", message);
            eprintln!();
            eprintln!("Usage: ripdb <get|set|purge|backup> <key> [json-value]");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  ripdb set user:1 '{{\"name\":\"Ann\"}}'");
            std::process::exit(2);
        }
    };

    init_tracing();

    let config = match RipConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };

    let tier = match connect(&config).await {
        Ok(tier) => tier,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    let result = run(&tier, command).await;

    if let Err(e) = tier.shutdown().await {
        tracing::warn!(error = %e, "Shutdown did not complete cleanly");
    }

    match result {
        Ok(Some(output)) => println!("{}", output),
        Ok(None) => {
            eprintln!("not found");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_args(&args(&["get", "user:1"])),
            Ok(Command::Get {
                key: "user:1".to_string()
            })
        );
        assert_eq!(
            parse_args(&args(&["set", "user:1", r#"{"name":"Ann"}"#])),
            Ok(Command::Set {
                key: "user:1".to_string(),
                value: json!({"name": "Ann"})
            })
        );
        assert_eq!(
            parse_args(&args(&["backup", "k"])),
            Ok(Command::Backup {
                key: "k".to_string()
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["get"])).is_err());
        assert!(parse_args(&args(&["get", "a", "b"])).is_err());
        assert!(parse_args(&args(&["set", "k", "{not json"])).is_err());
        assert!(parse_args(&args(&["drop", "k"])).is_err());
    }
}

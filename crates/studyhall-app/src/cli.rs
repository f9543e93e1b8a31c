use clap::{Parser, Subcommand};

/// studyhall: shared "who's online" presence for study groups.
#[derive(Parser, Debug)]
#[command(name = "studyhall", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<String>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join the online roster and print changes until Ctrl-C.
    Watch {
        /// User id to appear as. Ignored when an access token is set.
        #[arg(long)]
        user_id: Option<String>,

        #[arg(long)]
        email: Option<String>,

        /// Display name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Check that the presence table exists and is writable.
    Check,

    /// Delete stale presence rows once.
    Sweep,

    /// Print the users currently online.
    List,
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_watch_with_identity() {
        let args = Args::try_parse_from([
            "studyhall",
            "--log-level",
            "debug",
            "watch",
            "--user-id",
            "u1",
            "--name",
            "Ada",
        ])
        .unwrap();
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        match args.command {
            Command::Watch { user_id, email, name } => {
                assert_eq!(user_id.as_deref(), Some("u1"));
                assert_eq!(email, None);
                assert_eq!(name.as_deref(), Some("Ada"));
            }
            other => panic!("expected watch, got {other:?}"),
        }
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Args::try_parse_from(["studyhall"]).is_err());
        assert!(matches!(
            Args::try_parse_from(["studyhall", "--config", "/tmp/s.toml", "check"])
                .unwrap()
                .command,
            Command::Check
        ));
    }
}

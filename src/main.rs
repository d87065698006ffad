//! Export channel points balances for every channel a user follows.
//!
//! Put `clientId`, `clientSecret` and `authToken` in `config.json`, or set `CLIENT_ID`,
//! `CLIENT_SECRET` and `AUTH_TOKEN` (a `.env` file works too).
//! See <https://dev.twitch.tv/docs/authentication#registration> for more information.
//!
//! `http://localhost` has to be one of the application's redirect URIs unless `--redirect-url` says otherwise.
use std::{
    io::{BufRead, Write},
    path::PathBuf,
};

use clap::Parser;
use log::{error, info};
use twitch_channel_points::{
    auth::DEFAULT_REDIRECT_URL, config::DEFAULT_CONFIG_PATH, run, CodeSource, ConsolePrompt,
    Error, RedirectListener, RunOptions,
};
use twitch_oauth2::oauth2::AccessToken;

#[derive(Debug, Parser)]
#[command(name = "twitch_channel_points", version, about)]
struct Args {
    /// Credential file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// User whose follows are exported; prompted for when missing
    #[arg(long)]
    username: Option<String>,

    /// Directory the CSV is written to, defaults to the download directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Redirect URI registered for the application
    #[arg(long, default_value = DEFAULT_REDIRECT_URL)]
    redirect_url: String,

    /// Catch the redirect with a local web server instead of pasting the code
    #[arg(long)]
    listen: bool,

    /// Use this access token instead of authorizing
    #[arg(long, env = "TWITCH_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenv::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = try_main(args).await {
        error!("{}", e);
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            error!("  caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
}

async fn try_main(args: Args) -> Result<(), Error> {
    let username = match args.username {
        Some(username) => username,
        None => prompt_username()?,
    };

    let mut options = RunOptions::new(&username);
    options.config_path = args.config;
    options.redirect_uri = args.redirect_url;
    options.access_token = args
        .access_token
        .filter(|token| !token.is_empty())
        .map(AccessToken::new);
    if let Some(dir) = args.output_dir {
        options.output_dir = dir;
    }

    let mut source: Box<dyn CodeSource> = if args.listen {
        Box::new(RedirectListener::bind(&options.redirect_uri)?)
    } else {
        Box::new(ConsolePrompt::stdio())
    };

    info!("fetching followed channels for user: {}", username);
    let path = run(&options, source.as_mut()).await?;
    println!("Report written to {}", path.display());
    Ok(())
}

fn prompt_username() -> Result<String, Error> {
    print!("Enter the Username you want to get channel points for: ");
    std::io::stdout().flush().map_err(Error::Console)?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(Error::Console)?;

    let username = line.trim();
    if username.is_empty() {
        return Err(Error::NoUsername);
    }
    Ok(username.to_string())
}

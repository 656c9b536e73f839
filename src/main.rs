use clap::Parser;
use recipe_hub::config::{
    Args, Command, CommentCommand, RecipeCommand, RecipeFields, ThrottleCommand, log_filter,
};
use recipe_hub::models::{Recipe, RecipeInput};
use recipe_hub::session_clock::EXPIRED;
use recipe_hub::{
    ApiError, AppState, Clock, FileStore, KeyValueStore, RatingError, RatingOutcome, SessionError,
    SystemClock, metrics,
};
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

const THROTTLED_MESSAGE: &str = "More cooking, less scrolling ;D\n\
Our kitchen needs a moment to catch up. Why not try that recipe you've been eyeing?";

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Rating(#[from] RatingError),

    #[error("Log in first")]
    NotLoggedIn,
}

impl CliError {
    fn is_rate_limited(&self) -> bool {
        match self {
            CliError::Api(e) => e.is_rate_limited(),
            CliError::Session(SessionError::Api(e)) => e.is_rate_limited(),
            CliError::Rating(RatingError::RateLimited) => true,
            _ => false,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();

    // parse cli arguments
    let args = Args::parse();
    let throttle = match args.throttle_config() {
        Ok(throttle) => throttle,
        Err(e) => e.exit(),
    };

    let store: Arc<dyn KeyValueStore> = match FileStore::open(args.store_path()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "cannot open store");
            return ExitCode::FAILURE;
        }
    };

    let mut state = match AppState::new(
        &args.api_url,
        store,
        Arc::new(SystemClock),
        throttle,
    ) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    state.init().await;
    debug!(api = %args.api_url, "client ready");

    match run(&mut state, args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_rate_limited() => {
            eprintln!("{THROTTLED_MESSAGE}");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(state: &mut AppState, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { username, password } => {
            let session = state.session.login(&username, &password).await?;
            println!("Logged in as {}", session.user.username);
        }
        Command::Register {
            username,
            email,
            password,
            password2,
        } => {
            let session = state
                .session
                .register(&username, &email, &password, &password2)
                .await?;
            println!("Registered and logged in as {}", session.user.username);
        }
        Command::Logout => {
            state.session.logout();
            println!("Logged out");
        }
        Command::Refresh => {
            let session = state.session.refresh().await?;
            println!("Session refreshed until {}", session.expiry.to_rfc3339());
        }
        Command::Session { watch } => show_session(state, watch).await,
        Command::Recipes(cmd) => run_recipes(state, cmd).await?,
        Command::Comment(cmd) => run_comment(state, cmd).await?,
        Command::Rate { recipe_id, rating } => {
            let outcome = state.rate(recipe_id, rating).await?;
            match &outcome {
                RatingOutcome::Created(r) => println!("Rated recipe {recipe_id}: {}", r.rating),
                RatingOutcome::Updated { rating, .. } => {
                    println!("Updated rating for recipe {recipe_id}: {}", rating.rating)
                }
                RatingOutcome::Blocked { .. } => {
                    println!("Please wait before updating your rating again.")
                }
            }
            if let Some(message) = outcome.message() {
                println!("{message}");
            }
        }
        Command::Throttle(ThrottleCommand::Status { recipe_id }) => {
            let window = state.throttle.config().window_ms();
            let now = state.clock.now_ms();
            for record in state
                .throttle
                .recent_updates()
                .iter()
                .filter(|r| recipe_id.is_none_or(|id| id == r.subject_id))
            {
                let age = now.saturating_sub(record.timestamp);
                let left = window.saturating_sub(age).max(0) / 1000;
                println!(
                    "recipe {}: updated {}s ago, leaves window in {left}s",
                    record.subject_id,
                    age / 1000
                );
            }
            if let Some(id) = recipe_id {
                let decision = state.throttle.evaluate(id, false);
                println!(
                    "{} update(s) in window; next: {}",
                    state.throttle.count_for(id),
                    decision.message().unwrap_or_else(|| "allowed".to_string())
                );
            }
        }
        Command::Metrics => print!("{}", metrics::render()),
    }
    Ok(())
}

async fn show_session(state: &AppState, watch: bool) {
    let Some(user) = state.session.user() else {
        println!("Not logged in");
        return;
    };
    let role = if user.is_admin { " (admin)" } else { "" };
    println!("User: {}{role}", user.username);

    let clock = state.session.session_clock();
    if !watch {
        if let Some(display) = clock.tick(state.clock.now()) {
            println!("Session: {display}");
        }
        return;
    }

    let ticker = clock.watch(state.clock.clone());
    let mut rx = ticker.subscribe();
    loop {
        let display = rx.borrow_and_update().clone();
        if let Some(display) = &display {
            println!("Session: {display}");
            if display == EXPIRED {
                break;
            }
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    ticker.stop();
}

async fn run_recipes(state: &mut AppState, cmd: RecipeCommand) -> Result<(), CliError> {
    match cmd {
        RecipeCommand::List { page } => {
            let listing = state.api.recipes().list(page).await?;
            for recipe in &listing.results {
                println!(
                    "#{:<5} {} by {} ({} min, {})",
                    recipe.id,
                    recipe.title,
                    recipe.author.username,
                    recipe.cooking_time,
                    recipe.difficulty_summary()
                );
            }
            println!(
                "page {page}, {} recipe(s) total{}",
                listing.count,
                if listing.next.is_some() { ", more with --page" } else { "" }
            );
        }
        RecipeCommand::Show { id } => print_recipe(&state.api.recipes().get(id).await?),
        RecipeCommand::Create(fields) => {
            require_login(state)?;
            let recipe = state.api.recipes().create(&input(fields)).await?;
            println!("Created recipe #{}", recipe.id);
        }
        RecipeCommand::Update { id, fields } => {
            require_login(state)?;
            let recipe = state.api.recipes().update(id, &input(fields)).await?;
            println!("Updated recipe #{}", recipe.id);
        }
        RecipeCommand::Delete { id } => {
            require_login(state)?;
            state.api.recipes().delete(id).await?;
            println!("Deleted recipe #{id}");
        }
    }
    Ok(())
}

async fn run_comment(state: &mut AppState, cmd: CommentCommand) -> Result<(), CliError> {
    require_login(state)?;
    let comments = state.api.comments();
    match cmd {
        CommentCommand::Add { recipe_id, content } => {
            let comment = comments.create(recipe_id, &content).await?;
            println!("Added comment #{}", comment.id);
        }
        CommentCommand::Edit {
            recipe_id,
            comment_id,
            content,
        } => {
            comments.update(recipe_id, comment_id, &content).await?;
            println!("Updated comment #{comment_id}");
        }
        CommentCommand::Delete {
            recipe_id,
            comment_id,
        } => {
            comments.delete(recipe_id, comment_id).await?;
            println!("Deleted comment #{comment_id}");
        }
    }
    Ok(())
}

fn require_login(state: &mut AppState) -> Result<(), CliError> {
    state.session.expire_if_needed();
    match state.session.user() {
        Some(_) => Ok(()),
        None => Err(CliError::NotLoggedIn),
    }
}

fn input(fields: RecipeFields) -> RecipeInput {
    RecipeInput {
        title: fields.title,
        description: fields.description,
        ingredients: fields.ingredients,
        instructions: fields.instructions,
        cooking_time: fields.cooking_time,
    }
}

fn print_recipe(recipe: &Recipe) {
    println!("{} (#{})", recipe.title, recipe.id);
    println!("by {} | {} min", recipe.author.username, recipe.cooking_time);
    println!("Difficulty: {}", recipe.difficulty_summary());
    println!("\n{}\n", recipe.description);
    println!("Ingredients:");
    for item in recipe.ingredient_list() {
        println!("  - {item}");
    }
    println!("\nInstructions:\n{}", recipe.instructions);
    if !recipe.comments.is_empty() {
        println!("\nComments ({}):", recipe.comments.len());
        for c in &recipe.comments {
            println!("  [{}] {}: {}", c.created_at.format("%Y-%m-%d"), c.author.username, c.content);
        }
    }
}

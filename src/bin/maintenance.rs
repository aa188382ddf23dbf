use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use uuid::Uuid;

use ateste::{
    auth::password::hash_password,
    config::AppConfig,
    db,
    lifecycle::access::Role,
    models::NewUser,
    schema::users,
    validation::normalize_email,
};

const USAGE: &str = "Usage: maintenance create-user <name> <email> <password> [role]";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("create-user") => create_user(&args[1..])?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn create_user(args: &[String]) -> Result<()> {
    let [name, email, password, rest @ ..] = args else {
        bail!("{USAGE}");
    };
    let role = match rest.first() {
        Some(raw) => raw.parse::<Role>().map_err(anyhow::Error::msg)?,
        None => Role::User,
    };
    let email = normalize_email(email).map_err(anyhow::Error::msg)?;
    if name.trim().is_empty() {
        bail!("name must not be empty");
    }
    if password.len() < 8 {
        bail!("password must have at least 8 characters");
    }

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let mut conn = pool.get().context("failed to get database connection")?;
    db::run_migrations(&mut conn)?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        name: name.trim().to_string(),
        email: email.clone(),
        password_hash: hash_password(password)?,
        role: role.as_str().to_string(),
    };
    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
        .with_context(|| format!("failed to create user {email}"))?;

    println!("Created {role} user {email} ({})", new_user.id);
    Ok(())
}

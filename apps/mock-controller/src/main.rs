use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

mod state;

use state::{Access, MockError, Model, Store, OPERATOR};

#[derive(Parser)]
#[command(name = "mock-controller")]
#[command(about = "Minimal multi-tenant controller CLI for exercising permcheck")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a model (operator only)
    AddModel { name: String },
    /// Grant a user access to models and print a registration token
    AddUser {
        name: String,
        #[arg(long, value_delimiter = ',', required = true)]
        models: Vec<String>,
        #[arg(long, default_value = "read")]
        acl: String,
    },
    /// Revoke a level of access on models
    Revoke {
        name: String,
        #[arg(value_delimiter = ',')]
        models: Vec<String>,
        #[arg(long, default_value = "read")]
        acl: String,
    },
    /// Redeem a registration token interactively
    Register { token: String },
    /// Show a model
    Status {
        #[arg(short, long, default_value = "default")]
        model: String,
    },
    /// Deploy an application
    Deploy {
        charm: String,
        #[arg(short, long, default_value = "default")]
        model: String,
    },
    /// Remove an application
    RemoveApplication {
        name: String,
        #[arg(short, long, default_value = "default")]
        model: String,
    },
    /// List models the caller can see
    ListModels,
    /// Show a user's access on every model (operator only)
    ShowUser { name: String },
}

#[derive(Serialize, Deserialize)]
struct Account {
    user: String,
    #[serde(default)]
    controller: Option<String>,
}

fn data_root() -> Option<PathBuf> {
    std::env::var_os("JUJU_DATA")
        .map(PathBuf::from)
        .or_else(|| dirs::data_dir().map(|d| d.join("juju")))
}

fn caller() -> Result<String, MockError> {
    let path = data_root()
        .ok_or(MockError::NoCredentials)?
        .join("accounts.json");
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(serde_json::from_str::<Account>(&contents)?.user),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MockError::NoCredentials),
        Err(e) => Err(e.into()),
    }
}

fn has_fault(name: &str) -> bool {
    std::env::var("MOCK_CONTROLLER_FAULT")
        .map(|v| v.split(',').any(|f| f.trim() == name))
        .unwrap_or(false)
}

fn require_operator(user: &str) -> Result<(), MockError> {
    if user == OPERATOR {
        Ok(())
    } else {
        Err(MockError::PermissionDenied)
    }
}

fn hang() -> ! {
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

fn prompt(label: &str, lines: &mut impl Iterator<Item = std::io::Result<String>>) -> Result<String, MockError> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{}", label)?;
    stderr.flush()?;
    match lines.next() {
        Some(line) => Ok(line?.trim_end().to_string()),
        None => Err(MockError::Usage("unexpected end of input".to_string())),
    }
}

fn register(store: &Store, token: &str) -> Result<(), MockError> {
    store.view(|s| {
        if s.tokens.contains_key(token) {
            Ok(())
        } else {
            Err(MockError::InvalidToken)
        }
    })?;

    if has_fault("hang-register") {
        hang();
    }

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let controller = prompt("Enter a user name for this controller: ", &mut lines)?;
    let password = prompt("Enter a new password: ", &mut lines)?;
    let confirm = prompt("Confirm password: ", &mut lines)?;
    if password != confirm {
        return Err(MockError::PasswordMismatch);
    }

    let root = data_root().ok_or(MockError::NoCredentials)?;
    let user = store.update(|s| s.redeem(token))?;
    std::fs::create_dir_all(&root)?;
    let account = Account {
        user: user.clone(),
        controller: Some(controller.clone()),
    };
    std::fs::write(root.join("accounts.json"), serde_json::to_string_pretty(&account)?)?;

    println!(
        "Welcome, {}. You are now logged into \"{}\".",
        user, controller
    );
    std::io::stdout().flush()?;

    if has_fault("linger-register") {
        hang();
    }
    Ok(())
}

fn run(command: Command) -> Result<(), MockError> {
    let store = Store::from_env()?;

    if let Command::Register { token } = &command {
        return register(&store, token);
    }

    let user = caller()?;
    match command {
        Command::AddModel { name } => {
            require_operator(&user)?;
            store.update(|s| {
                s.models.entry(name.clone()).or_insert_with(Model::default);
                Ok(())
            })?;
            println!("Added '{}' model", name);
        }
        Command::AddUser { name, models, acl } => {
            require_operator(&user)?;
            let access: Access = acl.parse()?;
            let token = store.update(|s| s.grant(&name, &models, access))?;
            println!("User \"{}\" added", name);
            println!("Please send this command to {}:", name);
            println!("    mock-controller register {}", token);
        }
        Command::Revoke { name, models, acl } => {
            require_operator(&user)?;
            if models.is_empty() {
                return Err(MockError::Usage("no models specified".to_string()));
            }
            let access: Access = acl.parse()?;
            if has_fault("fail-revoke") {
                return Err(MockError::Unavailable);
            }
            if has_fault("noop-revoke") {
                store.view(|s| models.iter().try_for_each(|m| s.model(m).map(|_| ())))?;
            } else {
                store.update(|s| s.revoke(&name, &models, access))?;
            }
        }
        Command::Status { model } => {
            if user != OPERATOR && has_fault("crash-status") {
                return Err(MockError::Crash);
            }
            store.view(|s| {
                s.require(&user, &model, Access::Read)?;
                let m = s.model(&model)?;
                println!("Model    Controller  Access");
                let access = s.access_of(&user, &model)?.map(|a| a.as_str()).unwrap_or("-");
                println!("{:<8} {:<11} {}", model, "mock", access);
                println!();
                println!("App");
                for app in &m.applications {
                    println!("{}", app);
                }
                Ok(())
            })?;
        }
        Command::Deploy { charm, model } => {
            store.update(|s| {
                s.require(&user, &model, Access::Write)?;
                s.model_mut(&model)?.applications.insert(charm.clone());
                Ok(())
            })?;
            println!("Deployed \"{}\" to model \"{}\"", charm, model);
        }
        Command::RemoveApplication { name, model } => {
            store.update(|s| {
                s.require(&user, &model, Access::Write)?;
                if s.model_mut(&model)?.applications.remove(&name) {
                    Ok(())
                } else {
                    Err(MockError::ApplicationNotFound(name.clone()))
                }
            })?;
            println!("removing application {}", name);
        }
        Command::ListModels => {
            store.view(|s| {
                for name in s.models.keys() {
                    if let Some(access) = s.access_of(&user, name)? {
                        println!("{}  {}", name, access.as_str());
                    }
                }
                Ok(())
            })?;
        }
        Command::ShowUser { name } => {
            require_operator(&user)?;
            store.view(|s| {
                for (model, m) in &s.models {
                    let access = m.access.get(&name).map(|a| a.as_str()).unwrap_or("none");
                    println!("{}: {}", model, access);
                }
                Ok(())
            })?;
        }
        Command::Register { .. } => {}
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

use log::info;
use prbot::{
    api::GithubApi,
    database::{
        import_export::{convert_compatibility_data, export_data, import_data, ImportExportData},
        store::{
            ExternalAccountRightStore, ExternalAccountStore, MergeRuleStore, PullRequestStore,
            RepositoryRuleStore, RepositoryStore,
        },
        Database,
    },
    gif::TenorGifClient,
    lock::{LockClient, RedisLockClient},
    models::{
        ExternalAccount, ExternalAccountRight, MergeRule, MergeStrategy, PullRequestPath,
        RepositoryPath, RuleBranch,
    },
    server::{create_access_token, run_serve},
    sync::{SyncOrchestrator, SyncOutcome},
    Config, Context, Error, Result,
};
use rsa::{
    pkcs1::EncodeRsaPublicKey,
    pkcs8::{EncodePrivateKey, LineEnding},
    RsaPrivateKey, RsaPublicKey,
};
use std::{fs, path::PathBuf, process, sync::Arc};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "prbot", about = "Pull request automation bot")]
enum Options {
    /// Run the webhook server
    Serve,
    /// Check availability of external dependencies
    Check,
    /// Export database items to JSON
    Export {
        #[structopt(long, parse(from_os_str))]
        path: PathBuf,
        /// Overwrite an existing file
        #[structopt(long)]
        overwrite: bool,
    },
    /// Import database items from JSON
    Import {
        #[structopt(long, parse(from_os_str))]
        path: PathBuf,
        /// Accept the older integer-id export shape
        #[structopt(long)]
        compatibility: bool,
    },
    /// Manage repositories
    Repository(RepositoryCommand),
    /// Manage pull requests
    PullRequest(PullRequestCommand),
    /// Manage merge rules
    MergeRule(MergeRuleCommand),
    /// Manage repository rules
    RepositoryRule(RepositoryRuleCommand),
    /// Manage external accounts
    Account(AccountCommand),
    /// Manage external account rights
    AccountRight(AccountRightCommand),
}

#[derive(StructOpt)]
enum RepositoryCommand {
    /// List known repositories
    List,
    /// Show one repository
    Show { path: RepositoryPath },
    /// Set the default merge strategy
    SetStrategy {
        path: RepositoryPath,
        strategy: MergeStrategy,
    },
    /// Enable or disable automerge by default
    SetAutomerge {
        path: RepositoryPath,
        #[structopt(parse(try_from_str))]
        value: bool,
    },
    /// Enable or disable QA by default
    SetQa {
        path: RepositoryPath,
        #[structopt(parse(try_from_str))]
        value: bool,
    },
    /// Enable or disable checks by default
    SetChecks {
        path: RepositoryPath,
        #[structopt(parse(try_from_str))]
        value: bool,
    },
    /// Set the PR title validation pattern (empty to disable)
    SetTitleRegex { path: RepositoryPath, regex: String },
    /// Require manual interaction before unknown PRs are tracked
    SetManualInteraction {
        path: RepositoryPath,
        #[structopt(parse(try_from_str))]
        value: bool,
    },
}

#[derive(StructOpt)]
enum PullRequestCommand {
    /// List tracked pull requests of a repository
    List { path: RepositoryPath },
    /// Show one pull request
    Show { path: PullRequestPath },
    /// Force a synchronization pass
    Sync { path: PullRequestPath },
}

#[derive(StructOpt)]
enum MergeRuleCommand {
    /// List merge rules of a repository
    List { path: RepositoryPath },
    /// Create or update a merge rule
    Set {
        path: RepositoryPath,
        base: RuleBranch,
        head: RuleBranch,
        strategy: MergeStrategy,
    },
    /// Delete a merge rule
    Delete {
        path: RepositoryPath,
        base: RuleBranch,
        head: RuleBranch,
    },
}

#[derive(StructOpt)]
enum RepositoryRuleCommand {
    /// List repository rules
    List { path: RepositoryPath },
    /// Show one repository rule
    Show { path: RepositoryPath, name: String },
    /// Delete a repository rule
    Delete { path: RepositoryPath, name: String },
}

#[derive(StructOpt)]
enum AccountCommand {
    /// Create an external account with a fresh RSA keypair
    Create { username: String },
    /// Delete an external account
    Delete { username: String },
    /// List external accounts
    List,
    /// Issue an access token for an account
    Token { username: String },
}

#[derive(StructOpt)]
enum AccountRightCommand {
    /// Grant a repository right to an account
    Add {
        username: String,
        path: RepositoryPath,
    },
    /// Revoke a repository right from an account
    Remove {
        username: String,
        path: RepositoryPath,
    },
    /// List the rights of an account
    List { username: String },
}

#[tokio::main]
async fn main() {
    let options = Options::from_args();

    match run(options).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
        Err(err) => {
            eprintln!("Error: {:?}", err);
            process::exit(2);
        }
    }
}

async fn run(options: Options) -> Result<()> {
    let config = Config::from_env()?;

    env_logger::from_env(env_logger::Env::default().default_filter_or(&config.log_level)).init();

    let database = Arc::new(Database::connect(&config.database_url).await?);
    database.migrate().await?;

    let lock = Arc::new(RedisLockClient::connect(&config.lock_url).await?);
    let gif = Arc::new(TenorGifClient::new(config.tenor_key.clone()));
    let api = Arc::new(GithubApi::new(config.github_client()?));

    let ctx = Context {
        config,
        api,
        lock,
        gif,
        repository_store: database.clone(),
        pull_request_store: database.clone(),
        merge_rule_store: database.clone(),
        repository_rule_store: database.clone(),
        external_account_store: database.clone(),
        external_account_right_store: database.clone(),
    };

    match options {
        Options::Serve => {
            info!("prbot starting");
            run_serve(Arc::new(ctx)).await
        }
        Options::Check => {
            let database_ok = database.ping().await;
            let lock_ok = ctx.lock.ping().await.unwrap_or(false);

            println!("Database {}", if database_ok { "OK" } else { "KO" });
            println!("Lock {}", if lock_ok { "OK" } else { "KO" });

            if database_ok && lock_ok {
                Ok(())
            } else {
                Err("dependency check failed".into())
            }
        }
        Options::Export { path, overwrite } => {
            if path.exists() && !overwrite {
                return Err(
                    format!("output file `{}` already exists", path.display()).into()
                );
            }

            let data = export_data(&ctx).await?;
            fs::write(&path, serde_json::to_string_pretty(&data)?)?;
            println!("Exported to {}", path.display());
            Ok(())
        }
        Options::Import {
            path,
            compatibility,
        } => {
            let contents = fs::read_to_string(&path)?;
            let data = if compatibility {
                convert_compatibility_data(&serde_json::from_str(&contents)?)?
            } else {
                serde_json::from_str::<ImportExportData>(&contents)?
            };

            import_data(&ctx, data).await?;
            println!("Imported from {}", path.display());
            Ok(())
        }
        Options::Repository(command) => run_repository(&ctx, command).await,
        Options::PullRequest(command) => run_pull_request(&ctx, command).await,
        Options::MergeRule(command) => run_merge_rule(&ctx, command).await,
        Options::RepositoryRule(command) => run_repository_rule(&ctx, command).await,
        Options::Account(command) => run_account(&ctx, command).await,
        Options::AccountRight(command) => run_account_right(&ctx, command).await,
    }
}

async fn run_repository(ctx: &Context, command: RepositoryCommand) -> Result<()> {
    match command {
        RepositoryCommand::List => {
            for repository in ctx.repository_store.all().await? {
                println!("{}/{}", repository.owner, repository.name);
            }
            Ok(())
        }
        RepositoryCommand::Show { path } => {
            let repository = ctx
                .repository_store
                .get_or_raise(&path.owner, &path.name)
                .await?;
            println!("{:#?}", repository);
            Ok(())
        }
        RepositoryCommand::SetStrategy { path, strategy } => {
            ctx.repository_store
                .set_default_strategy(&path.owner, &path.name, strategy)
                .await
        }
        RepositoryCommand::SetAutomerge { path, value } => {
            ctx.repository_store
                .set_default_automerge(&path.owner, &path.name, value)
                .await
        }
        RepositoryCommand::SetQa { path, value } => {
            ctx.repository_store
                .set_default_enable_qa(&path.owner, &path.name, value)
                .await
        }
        RepositoryCommand::SetChecks { path, value } => {
            ctx.repository_store
                .set_default_enable_checks(&path.owner, &path.name, value)
                .await
        }
        RepositoryCommand::SetTitleRegex { path, regex } => {
            // Reject invalid patterns before they break every sync.
            regex::Regex::new(&regex)?;
            ctx.repository_store
                .set_pr_title_validation_regex(&path.owner, &path.name, &regex)
                .await
        }
        RepositoryCommand::SetManualInteraction { path, value } => {
            ctx.repository_store
                .set_manual_interaction(&path.owner, &path.name, value)
                .await
        }
    }
}

async fn run_pull_request(ctx: &Context, command: PullRequestCommand) -> Result<()> {
    match command {
        PullRequestCommand::List { path } => {
            for pull_request in ctx
                .pull_request_store
                .filter(&path.owner, &path.name)
                .await?
            {
                println!("{}#{}", pull_request.repository_path, pull_request.number);
            }
            Ok(())
        }
        PullRequestCommand::Show { path } => {
            let pull_request = ctx
                .pull_request_store
                .get_or_raise(&path.owner, &path.name, path.number)
                .await?;
            println!("{:#?}", pull_request);
            Ok(())
        }
        PullRequestCommand::Sync { path } => {
            let outcome = SyncOrchestrator::new(ctx)
                .process(&path.owner, &path.name, path.number, true)
                .await?;

            match outcome {
                SyncOutcome::Success { step_label, .. } => {
                    println!("Synchronized {}: step/{}", path, step_label)
                }
                SyncOutcome::Skipped => println!("Skipped {}", path),
            }
            Ok(())
        }
    }
}

async fn run_merge_rule(ctx: &Context, command: MergeRuleCommand) -> Result<()> {
    match command {
        MergeRuleCommand::List { path } => {
            for rule in ctx.merge_rule_store.filter(&path.owner, &path.name).await? {
                println!(
                    "{} <- {}: {}",
                    rule.base_branch, rule.head_branch, rule.strategy
                );
            }
            Ok(())
        }
        MergeRuleCommand::Set {
            path,
            base,
            head,
            strategy,
        } => {
            ctx.merge_rule_store
                .create_or_update(MergeRule {
                    repository_path: path,
                    base_branch: base,
                    head_branch: head,
                    strategy,
                })
                .await?;
            Ok(())
        }
        MergeRuleCommand::Delete { path, base, head } => {
            ctx.merge_rule_store
                .get_or_raise(&path.owner, &path.name, &base, &head)
                .await?;
            ctx.merge_rule_store
                .delete(&path.owner, &path.name, &base, &head)
                .await?;
            Ok(())
        }
    }
}

async fn run_repository_rule(ctx: &Context, command: RepositoryRuleCommand) -> Result<()> {
    match command {
        RepositoryRuleCommand::List { path } => {
            for rule in ctx
                .repository_rule_store
                .filter(&path.owner, &path.name)
                .await?
            {
                println!("{}", rule.name);
            }
            Ok(())
        }
        RepositoryRuleCommand::Show { path, name } => {
            let rule = ctx
                .repository_rule_store
                .get_or_raise(&path.owner, &path.name, &name)
                .await?;
            println!("{:#?}", rule);
            Ok(())
        }
        RepositoryRuleCommand::Delete { path, name } => {
            ctx.repository_rule_store
                .get_or_raise(&path.owner, &path.name, &name)
                .await?;
            ctx.repository_rule_store
                .delete(&path.owner, &path.name, &name)
                .await?;
            Ok(())
        }
    }
}

async fn run_account(ctx: &Context, command: AccountCommand) -> Result<()> {
    match command {
        AccountCommand::Create { username } => {
            let (private_key, public_key) = generate_rsa_keypair()?;
            ctx.external_account_store
                .create_or_update(ExternalAccount {
                    username: username.clone(),
                    public_key,
                    private_key,
                })
                .await?;
            println!("Account `{}` created", username);
            Ok(())
        }
        AccountCommand::Delete { username } => {
            ctx.external_account_store.get_or_raise(&username).await?;
            ctx.external_account_store.delete(&username).await?;
            Ok(())
        }
        AccountCommand::List => {
            for account in ctx.external_account_store.all().await? {
                println!("{}", account.username);
            }
            Ok(())
        }
        AccountCommand::Token { username } => {
            let account = ctx.external_account_store.get_or_raise(&username).await?;
            println!(
                "{}",
                create_access_token(&account.username, &account.private_key)?
            );
            Ok(())
        }
    }
}

async fn run_account_right(ctx: &Context, command: AccountRightCommand) -> Result<()> {
    match command {
        AccountRightCommand::Add { username, path } => {
            ctx.external_account_store.get_or_raise(&username).await?;
            ctx.repository_store
                .get_or_raise(&path.owner, &path.name)
                .await?;
            ctx.external_account_right_store
                .get_or_create(ExternalAccountRight {
                    repository_path: path,
                    username,
                })
                .await?;
            Ok(())
        }
        AccountRightCommand::Remove { username, path } => {
            ctx.external_account_right_store
                .get_or_raise(&path.owner, &path.name, &username)
                .await?;
            ctx.external_account_right_store
                .delete(&path.owner, &path.name, &username)
                .await?;
            Ok(())
        }
        AccountRightCommand::List { username } => {
            for right in ctx.external_account_right_store.filter(&username).await? {
                println!("{}", right.repository_path);
            }
            Ok(())
        }
    }
}

/// 4096-bit RSA keypair, PKCS8 private / PKCS1 public, both PEM-encoded.
fn generate_rsa_keypair() -> Result<(String, String)> {
    let mut rng = rand::thread_rng();
    let private_key =
        RsaPrivateKey::new(&mut rng, 4096).map_err(|e| Error::from(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::from(e.to_string()))?
        .to_string();
    let public_pem = public_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| Error::from(e.to_string()))?;

    Ok((private_pem, public_pem))
}

use contact_form::{
    config::Settings,
    secrets::{AwsSecretsManagerSecretRepository, SecretRepository},
    security::{NonceKey, NonceSigner, NONCE_SECRET_NAME},
    service::ContactFormService,
    transport::SmtpMailer,
};
use lambda_http::{run, Error};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let settings = Settings::from_env();
    let secrets_repository = AwsSecretsManagerSecretRepository::open().await;
    let nonce_key: NonceKey = secrets_repository.get_secret(NONCE_SECRET_NAME).await?;
    let signer = NonceSigner::new(nonce_key.key);
    let forms = settings.load_forms()?.build(&signer)?;
    info!("Loaded {} contact form(s)", forms.len());

    let router = ContactFormService::new(SmtpMailer::new(secrets_repository), &settings.endpoint)
        .with_forms(forms)
        .router();

    match settings.listen.as_deref() {
        Some(address) => {
            let listener = tokio::net::TcpListener::bind(address).await?;
            info!("Listening on {address}");
            axum::serve(listener, router).await?;
        }
        None => run(router).await?,
    }
    Ok(())
}

use log::debug;
use mailin_embedded::{Handler, Server, SslConfig};
use std::{net::IpAddr, sync::Arc, time::Duration};
use tokio::{
    sync::watch::{self, error::RecvError, Receiver, Sender},
    time::timeout,
};

pub const SMTP_PORT: u16 = 4567;
pub const POISONED_SMTP_PORT: u16 = 4568;

const SERVER_NAME: &str = "contact-form.test";

/// Records the envelope and raw data of each message it accepts.
#[derive(Clone)]
struct RecordingHandler {
    recipients: Vec<String>,
    data: Vec<u8>,
    sink: Arc<Sender<ReceivedMail>>,
}

/// A message as seen by the fake server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceivedMail {
    pub recipients: Vec<String>,
    pub content: String,
}

impl Handler for RecordingHandler {
    fn rcpt(&mut self, to: &str) -> mailin_embedded::Response {
        self.recipients.push(to.to_string());
        mailin_embedded::response::OK
    }

    fn data(&mut self, buf: &[u8]) -> std::io::Result<()> {
        debug!("Fake SMTP server got data:\n{}", String::from_utf8_lossy(buf));
        self.data.extend(buf);
        Ok(())
    }

    fn data_end(&mut self) -> mailin_embedded::Response {
        let mail = ReceivedMail {
            recipients: std::mem::take(&mut self.recipients),
            content: String::from_utf8_lossy(&std::mem::take(&mut self.data)).into_owned(),
        };
        if self.sink.send(mail).is_err() {
            return mailin_embedded::response::INTERNAL_ERROR;
        }
        mailin_embedded::response::OK
    }

    fn auth_plain(
        &mut self,
        authorization_id: &str,
        authentication_id: &str,
        _password: &str,
    ) -> mailin_embedded::Response {
        debug!("Fake SMTP server authenticated {authorization_id}, {authentication_id}");
        mailin_embedded::response::AUTH_OK
    }
}

/// An SMTP server on [`SMTP_PORT`] which accepts everything and hands each
/// message to the test awaiting [`FakeSmtpServer::last_mail`].
pub struct FakeSmtpServer(
    std::sync::Mutex<Option<Server<RecordingHandler>>>,
    tokio::sync::Mutex<Receiver<ReceivedMail>>,
);

impl FakeSmtpServer {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(ReceivedMail::default());
        let handler = RecordingHandler {
            recipients: Vec::new(),
            data: Vec::new(),
            sink: Arc::new(sender),
        };
        let mut server = Server::new(handler);
        server
            .with_name(SERVER_NAME)
            .with_ssl(SslConfig::None)
            .unwrap()
            .with_addr(format!("127.0.0.1:{SMTP_PORT}"))
            .unwrap();
        Self(
            std::sync::Mutex::new(Some(server)),
            tokio::sync::Mutex::new(receiver),
        )
    }

    /// Starts serving on a background thread. Later calls do nothing.
    pub fn start(&self) {
        let mut guard = self.0.lock().unwrap();
        if let Some(server) = guard.take() {
            std::thread::spawn(move || {
                let _ = server.serve();
            });
        }
    }

    pub async fn last_mail(&self) -> Result<ReceivedMail, RecvError> {
        let mut receiver = self.1.lock().await;
        receiver.changed().await?;
        let mail = receiver.borrow_and_update().clone();
        drop(receiver);
        Ok(mail)
    }

    pub async fn last_mail_content(&self) -> Result<String, RecvError> {
        Ok(self.last_mail().await?.content)
    }

    /// Discards a message left over from a previous test.
    pub async fn flush(&self) {
        let mut receiver = self.1.lock().await;
        let _ = timeout(Duration::from_millis(100), receiver.changed()).await;
        receiver.borrow_and_update();
    }

    pub fn setup_environment() {
        std::env::set_var("SMTP_URL", format!("smtp://localhost:{SMTP_PORT}"));
    }
}

impl Default for FakeSmtpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct PoisonedSmtpHandler;

impl Handler for PoisonedSmtpHandler {
    fn helo(&mut self, _ip: IpAddr, _domain: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }

    fn mail(&mut self, _ip: IpAddr, _domain: &str, _from: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }
}

/// Starts a server on [`POISONED_SMTP_PORT`] which rejects every message.
pub fn start_poisoned_smtp_server() {
    let mut server = Server::new(PoisonedSmtpHandler);
    server
        .with_name(SERVER_NAME)
        .with_ssl(SslConfig::None)
        .unwrap()
        .with_addr(format!("127.0.0.1:{POISONED_SMTP_PORT}"))
        .unwrap();
    std::thread::spawn(move || {
        let _ = server.serve();
    });
}

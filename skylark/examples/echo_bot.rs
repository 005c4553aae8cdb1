use std::env::args;
use std::process::exit;
use std::str::FromStr;

use skylark::{Client, Config, Jid, Message, Presence};

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = args().collect();
    if args.len() != 3 {
        println!("Usage: {} <jid> <password>", args[0]);
        exit(1);
    }
    let jid = Jid::from_str(&args[1]).unwrap_or_else(|_| panic!("Invalid JID: {}", &args[1]));
    let username = jid.node().expect("JID needs a node part").to_owned();
    let password = args[2].clone();

    let mut config = Config::new(jid.domain()).with_credentials(username, password);
    if let Some(resource) = jid.resource() {
        config = config.with_resource(resource);
    }
    config.debug_stanzas = true;

    let client = Client::new(config);

    let echo_client = client.clone();
    client.on_message(move |message| {
        let Some(from) = message.from.clone() else { return };
        let Some(body) = message
            .payloads
            .iter()
            .find(|payload| payload.name() == "body")
            .map(|payload| payload.text())
        else {
            return;
        };
        if message.type_.as_deref() == Some("error") {
            return;
        }
        println!("echoing {:?} back to {}", body, from);
        let reply = Message::chat(from, &body);
        let echo_client = echo_client.clone();
        tokio::spawn(async move {
            if let Err(e) = echo_client.send_message(reply).await {
                eprintln!("sending reply failed: {}", e);
            }
        });
    });
    client.on_error(|error| {
        eprintln!("session error: {}", error);
    });

    client.connect().await.expect("connection failed");
    println!(
        "Online at {}",
        client
            .bound_jid()
            .map(|jid| jid.to_string())
            .unwrap_or_else(|| "unknown".to_owned())
    );
    client
        .send_presence(Presence::available())
        .await
        .expect("sending presence failed");

    // Echo until interrupted.
    tokio::signal::ctrl_c().await.ok();
    client.close().await;
}

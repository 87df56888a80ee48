use std::io::Write;

use sse_connect::Client;

#[tokio::main]
async fn main() {
    let request = reqwest::Client::new()
        .get("https://sse.test-free.online/api/story")
        .build()
        .unwrap();

    let client = Client::default();
    let connection = client.new_connection(request);

    connection.subscribe_messages(|event| {
        print!("{} ", event.data);
        std::io::stdout().flush().unwrap();
    });

    if let Err(error) = connection.connect().await {
        eprintln!("connection ended: {error}");
    }
    println!();
}

use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;

use super::error::{MongoDaoError, MongoResult};

const PING_ATTEMPTS: u32 = 10;
const FIRST_PING_DELAY: Duration = Duration::from_millis(250);
const MAX_PING_DELAY: Duration = Duration::from_secs(5);

/// Construct a client and wait for the database to answer a ping, backing
/// off between attempts. The returned handle keeps the client alive.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<Database> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut attempt = 1;
    let mut delay = FIRST_PING_DELAY;
    loop {
        let err = match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => return Ok(database),
            Err(err) => err,
        };
        if attempt >= PING_ATTEMPTS {
            return Err(MongoDaoError::InitialPing {
                attempts: attempt,
                source: err,
            });
        }
        attempt += 1;
        sleep(delay).await;
        delay = (delay * 2).min(MAX_PING_DELAY);
    }
}

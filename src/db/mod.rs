use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};
use rocket::fairing::AdHoc;

pub const USERS: &str = "users";
pub const CARS: &str = "cars";
pub const BOOKINGS: &str = "bookings";
pub const INVOICES: &str = "invoices";
pub const LIKES: &str = "likes";
pub const CAR_RATINGS: &str = "car_ratings";
pub const ADDRESSES: &str = "addresses";

pub fn init() -> AdHoc {
    AdHoc::on_ignite("MongoDB", |rocket| async {
        match connect().await {
            Ok((client, database)) => {
                info!("✓ MongoDB connected successfully");
                if let Err(e) = ensure_indexes(&database).await {
                    error!("✗ Failed to create MongoDB indexes: {}", e);
                }
                rocket.manage(client).manage(database)
            }
            Err(e) => {
                error!("✗ Failed to connect to MongoDB: {}", e);
                rocket
            }
        }
    })
}

async fn connect() -> Result<(Client, Database), mongodb::error::Error> {
    let uri = crate::config::Config::mongodb_uri();
    let client = Client::with_uri_str(&uri).await?;

    // Test connection
    client
        .database("admin")
        .run_command(doc! {"ping": 1}, None)
        .await?;

    let database = client.database(&crate::config::Config::mongodb_database());
    Ok((client, database))
}

fn unique(keys: mongodb::bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let plan = [
        (USERS, doc! { "email": 1 }),
        (BOOKINGS, doc! { "booking_id": 1 }),
        (INVOICES, doc! { "invoice_id": 1 }),
        (INVOICES, doc! { "booking_id": 1 }),
        (LIKES, doc! { "user_id": 1, "car_id": 1 }),
        (CAR_RATINGS, doc! { "user_id": 1, "car_id": 1 }),
    ];

    for (collection, keys) in plan {
        db.collection::<mongodb::bson::Document>(collection)
            .create_index(unique(keys), None)
            .await?;
    }
    Ok(())
}

/// True for a unique index violation (E11000).
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == 11000
    )
}

pub type DbConn = Database;

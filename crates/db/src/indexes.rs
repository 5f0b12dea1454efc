use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Rooms. The unique customer_id index is load-bearing: it is what
    // collapses concurrent get-or-create calls into a single room.
    create_indexes(
        db,
        "support_rooms",
        vec![
            index_unique(bson::doc! { "customer_id": 1 }),
            index(bson::doc! { "status": 1, "last_message_at": -1 }),
        ],
    )
    .await?;

    // Messages. (room_id, created_at, _id) matches the history sort so
    // pagination never scans.
    create_indexes(
        db,
        "support_messages",
        vec![
            index(bson::doc! { "room_id": 1, "created_at": 1, "_id": 1 }),
            index(bson::doc! { "room_id": 1, "sender_role": 1, "is_read": 1 }),
        ],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    let coll = db.collection::<bson::Document>(collection);
    coll.create_indexes(indexes).await?;
    info!(collection, "Indexes created");
    Ok(())
}

use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;

use crate::db::{self, LIKES};
use crate::models::Like;
use crate::utils::ApiError;

#[rocket::async_trait]
pub trait LikeStore: Send + Sync {
    async fn find_like(&self, user_id: &ObjectId, car_id: &ObjectId) -> Result<Option<Like>, ApiError>;
    async fn insert_like(&self, like: &Like) -> Result<(), ApiError>;
    async fn delete_like(&self, like_id: &ObjectId) -> Result<(), ApiError>;
}

#[rocket::async_trait]
impl LikeStore for Database {
    async fn find_like(&self, user_id: &ObjectId, car_id: &ObjectId) -> Result<Option<Like>, ApiError> {
        Ok(self
            .collection::<Like>(LIKES)
            .find_one(doc! { "user_id": user_id, "car_id": car_id }, None)
            .await?)
    }

    async fn insert_like(&self, like: &Like) -> Result<(), ApiError> {
        match self.collection::<Like>(LIKES).insert_one(like, None).await {
            Ok(_) => Ok(()),
            // a concurrent toggle already liked it
            Err(e) if db::is_duplicate_key(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_like(&self, like_id: &ObjectId) -> Result<(), ApiError> {
        self.collection::<Like>(LIKES)
            .delete_one(doc! { "_id": like_id }, None)
            .await?;
        Ok(())
    }
}

/// Flips the like for (user, car); returns whether the car is liked afterwards.
pub async fn toggle_like<S: LikeStore + ?Sized>(
    store: &S,
    user_id: ObjectId,
    car_id: ObjectId,
) -> Result<bool, ApiError> {
    match store.find_like(&user_id, &car_id).await? {
        Some(existing) => {
            if let Some(id) = existing.id {
                store.delete_like(&id).await?;
            }
            Ok(false)
        }
        None => {
            let like = Like {
                id: Some(ObjectId::new()),
                user_id,
                car_id,
                created_at: DateTime::now(),
            };
            store.insert_like(&like).await?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryLikes {
        likes: Mutex<Vec<Like>>,
    }

    #[rocket::async_trait]
    impl LikeStore for MemoryLikes {
        async fn find_like(&self, user_id: &ObjectId, car_id: &ObjectId) -> Result<Option<Like>, ApiError> {
            let likes = self.likes.lock().unwrap();
            Ok(likes.iter().find(|l| &l.user_id == user_id && &l.car_id == car_id).cloned())
        }

        async fn insert_like(&self, like: &Like) -> Result<(), ApiError> {
            self.likes.lock().unwrap().push(like.clone());
            Ok(())
        }

        async fn delete_like(&self, like_id: &ObjectId) -> Result<(), ApiError> {
            self.likes.lock().unwrap().retain(|l| l.id.as_ref() != Some(like_id));
            Ok(())
        }
    }

    #[tokio::test]
    async fn toggling_twice_restores_state() {
        let store = MemoryLikes::default();
        let (user, car) = (ObjectId::new(), ObjectId::new());

        assert!(toggle_like(&store, user, car).await.unwrap());
        assert_eq!(store.likes.lock().unwrap().len(), 1);

        assert!(!toggle_like(&store, user, car).await.unwrap());
        assert!(store.likes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn likes_are_per_user() {
        let store = MemoryLikes::default();
        let (alice, bob, car) = (ObjectId::new(), ObjectId::new(), ObjectId::new());

        assert!(toggle_like(&store, alice, car).await.unwrap());
        assert!(toggle_like(&store, bob, car).await.unwrap());
        assert!(!toggle_like(&store, alice, car).await.unwrap());

        let likes = store.likes.lock().unwrap();
        assert_eq!(likes.len(), 1);
        assert_eq!(likes[0].user_id, bob);
    }
}

pub mod credentials;
pub mod firestore;
pub mod telegram;

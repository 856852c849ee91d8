mod codes;
mod id_generator;

pub use codes::{hash_code, new_confirmation_code, verify_code, CODE_LENGTH};
pub use id_generator::{IdGenerator, IdGeneratorError};

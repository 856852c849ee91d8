use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use marketplace_engine::traits::{
    AuthApiError,
    CartError,
    CatalogError,
    OrderEngineError,
    RateLimitError,
    ShippingError,
    TaxRateError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Payload deserialization error")]
    CouldNotDeserializePayload,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("The confirmation code was rejected. {0}")]
    InvalidConfirmationCode(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request conflicts with the current state. {0}")]
    Conflict(String),
    #[error("The request cannot be processed. {0}")]
    UnprocessableEntity(String),
    #[error("Too many requests. Try again later.")]
    TooManyRequests,
    #[error("The payment provider could not complete the request.")]
    PaymentProviderError(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CouldNotDeserializePayload => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidConfirmationCode(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::ValidationError(_) => StatusCode::UNAUTHORIZED,
                AuthError::PoorlyFormattedToken(_) => StatusCode::BAD_REQUEST,
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            },
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::PaymentProviderError(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Internal errors wrap database and backend detail; that goes to the logs, never to the
        // client. Same for upstream provider response bodies.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("💻️ {self}");
            "Internal server error.".to_string()
        } else {
            if let Self::PaymentProviderError(detail) = self {
                log::error!("💻️ Payment provider error: {detail}");
            }
            self.to_string()
        };
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": message }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No access token was provided.")]
    MissingToken,
    #[error("Access token is invalid. {0}")]
    ValidationError(String),
    #[error("Access token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
}

impl From<AuthApiError> for ServerError {
    fn from(e: AuthApiError) -> Self {
        match e {
            AuthApiError::AlreadyExists => Self::Conflict(e.to_string()),
            AuthApiError::InvalidCredentials |
            AuthApiError::InvalidToken |
            AuthApiError::TokenRevoked |
            AuthApiError::TokenExpired => Self::AuthenticationError(AuthError::ValidationError(e.to_string())),
            AuthApiError::CodeNotFound | AuthApiError::CodeExpired | AuthApiError::CodeUsed | AuthApiError::InvalidCode => {
                Self::InvalidConfirmationCode(e.to_string())
            },
            AuthApiError::InvalidEmail | AuthApiError::WeakPassword(_) => Self::InvalidRequestBody(e.to_string()),
            AuthApiError::UserNotFound => Self::NoRecordFound("User".to_string()),
            AuthApiError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
            AuthApiError::HashingError(e) => Self::BackendError(format!("Password hashing error: {e}")),
        }
    }
}

impl From<OrderEngineError> for ServerError {
    fn from(e: OrderEngineError) -> Self {
        match e {
            OrderEngineError::OrderNotFound(id) => Self::NoRecordFound(format!("Order {id}")),
            OrderEngineError::AddressNotFound(id) => Self::NoRecordFound(format!("Address {id}")),
            OrderEngineError::EmptyCart | OrderEngineError::AmountNotPositive | OrderEngineError::Unshippable => {
                Self::UnprocessableEntity(e.to_string())
            },
            OrderEngineError::InvalidState(_) | OrderEngineError::IntentMismatch => Self::Conflict(e.to_string()),
            OrderEngineError::UnsupportedEvent(_) => Self::InvalidRequestBody(e.to_string()),
            OrderEngineError::CartError(e) => e.into(),
            OrderEngineError::ProviderError(e) => Self::PaymentProviderError(e.to_string()),
            OrderEngineError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}

impl From<CartError> for ServerError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ProductNotFound(id) => Self::NoRecordFound(format!("Product {id}")),
            CartError::ItemNotInCart(id) => Self::NoRecordFound(format!("Product {id} in the cart")),
            CartError::InsufficientInventory { .. } => Self::Conflict(e.to_string()),
            CartError::InvalidQuantity(_) => Self::InvalidRequestBody(e.to_string()),
            CartError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}

impl From<CatalogError> for ServerError {
    fn from(e: CatalogError) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<ShippingError> for ServerError {
    fn from(e: ShippingError) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<TaxRateError> for ServerError {
    fn from(e: TaxRateError) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<RateLimitError> for ServerError {
    fn from(e: RateLimitError) -> Self {
        Self::BackendError(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use actix_web::body::MessageBody;

    use super::*;

    fn body_of(e: &ServerError) -> String {
        let bytes = e.error_response().into_body().try_into_bytes().unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn internal_errors_never_leak_their_detail() {
        let e = ServerError::BackendError("Database error: no such column: secret_stuff".to_string());
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(&e);
        assert!(!body.contains("secret_stuff"), "backend detail leaked: {body}");
        assert!(body.contains("Internal server error."));

        let e = ServerError::Unspecified("sqlx pool timed out".to_string());
        assert!(!body_of(&e).contains("sqlx"));
    }

    #[test]
    fn provider_errors_return_the_generic_message() {
        let e = ServerError::PaymentProviderError("upstream said: invalid api key sk_live_123".to_string());
        assert_eq!(e.status_code(), StatusCode::BAD_GATEWAY);
        let body = body_of(&e);
        assert!(!body.contains("sk_live_123"), "upstream body leaked: {body}");
    }

    #[test]
    fn client_errors_keep_their_message() {
        let e = ServerError::NoRecordFound("Order 7".to_string());
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
        assert!(body_of(&e).contains("Order 7"));
    }
}

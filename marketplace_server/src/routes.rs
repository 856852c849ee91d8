//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don't block
//! execution.

use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use log::*;
use marketplace_engine::{
    db_types::{Address, OrderItem, Role},
    order_objects::OrderQueryFilter,
    traits::{
        AuthManagement,
        CartManagement,
        CatalogManagement,
        OrderManagement,
        PaymentProvider,
        ShippingManagement,
        TaxProvider,
        TaxRateStore,
        WebhookOutcome,
    },
    AuthApi,
    CartApi,
    OrderFlowApi,
    ShippingApi,
    TaxApi,
};
use mps_common::DEFAULT_CURRENCY;
use stripe_tools::{is_supported_event, StripeEvent};

use crate::{
    auth::{JwtClaims, TokenIssuer},
    data_objects::{
        CartItemRequest,
        ConfirmPasswordResetRequest,
        ConfirmRegisterRequest,
        JsonResponse,
        LoginRequest,
        NewOrderParams,
        NewShippingExclusionRequest,
        NewShippingZoneRequest,
        OrderSearchParams,
        PasswordResetRequest,
        PublicOrderSummary,
        RefreshTokenRequest,
        RegisterRequest,
        TaxEstimateParams,
        TaxEstimateResponse,
        TokenResponse,
    },
    errors::ServerError,
    integrations::payload_from_event,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:ty),*])  => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds)++ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Accounts  ----------------------------------------------------

/// Route handler for the registration endpoint
///
/// Starts a registration for the given email. A confirmation code is generated and handed to the
/// email hook; the account only exists once `/register/confirm` succeeds. Registered manually in
/// the server (rather than with `route!`) because it carries a rate limit wrap.
pub async fn register<A: AuthManagement>(
    body: web::Json<RegisterRequest>,
    api: web::Data<AuthApi<A>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received registration request");
    api.register(&body.email).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::new("Check your email for a confirmation code.")))
}

route!(confirm_register => Post "/register/confirm" impl AuthManagement);
/// Completes a registration: checks the emailed code, creates the account and signs the caller
/// in by returning a token pair. A caller presenting a guest token is promoted in place, keeping
/// their cart and order history.
pub async fn confirm_register<A: AuthManagement>(
    body: web::Json<ConfirmRegisterRequest>,
    claims: Option<JwtClaims>,
    api: web::Data<AuthApi<A>>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received registration confirmation request");
    let guest_id = claims.filter(|c| c.role == Role::Guest).map(|c| c.sub);
    let user = api.confirm_registration(&body.email, &body.code, &body.password, guest_id).await?;
    let tokens = issue_token_pair(&user, api.as_ref(), signer.as_ref()).await?;
    Ok(HttpResponse::Created().json(tokens))
}

/// Route handler for guest sessions. Creates an anonymous account and signs it in, so shoppers
/// can build a cart and place orders before registering. Registered manually in the server
/// because it carries a rate limit wrap.
pub async fn guest_session<A: AuthManagement>(
    api: web::Data<AuthApi<A>>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received guest session request");
    let guest = api.create_guest().await?;
    let tokens = issue_token_pair(&guest, api.as_ref(), signer.as_ref()).await?;
    Ok(HttpResponse::Created().json(tokens))
}

route!(login => Post "/users/login" impl AuthManagement);
pub async fn login<A: AuthManagement>(
    body: web::Json<LoginRequest>,
    api: web::Data<AuthApi<A>>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received login request");
    let user = api.login(&body.email, &body.password).await?;
    let tokens = issue_token_pair(&user, api.as_ref(), signer.as_ref()).await?;
    Ok(HttpResponse::Ok().json(tokens))
}

route!(refresh_token => Post "/users/refresh-token" impl AuthManagement);
/// Exchanges a refresh token for a fresh token pair. The presented token is revoked in the same
/// transaction (rotation-on-use), so replaying it afterwards fails with 401.
pub async fn refresh_token<A: AuthManagement>(
    body: web::Json<RefreshTokenRequest>,
    api: web::Data<AuthApi<A>>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received token refresh request");
    let (user, refresh_secret) = api.rotate_refresh_token(&body.refresh_token).await?;
    let access = signer.issue_token(&user)?;
    Ok(HttpResponse::Ok().json(TokenResponse::bearer(access, refresh_secret, signer.expiry_secs())))
}

/// Route handler for password reset requests. Registered manually because of its rate limit.
/// Responds identically for known and unknown emails.
pub async fn password_reset<A: AuthManagement>(
    body: web::Json<PasswordResetRequest>,
    api: web::Data<AuthApi<A>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received password reset request");
    api.request_password_reset(&body.email).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::new("If the email is registered, a reset code has been sent.")))
}

route!(confirm_password_reset => Post "/users/password-reset/confirm" impl AuthManagement);
pub async fn confirm_password_reset<A: AuthManagement>(
    body: web::Json<ConfirmPasswordResetRequest>,
    api: web::Data<AuthApi<A>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received password reset confirmation request");
    api.confirm_password_reset(&body.email, &body.code, &body.new_password).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::new("The password has been reset. All sessions have been signed out.")))
}

async fn issue_token_pair<A: AuthManagement>(
    user: &marketplace_engine::db_types::User,
    api: &AuthApi<A>,
    signer: &TokenIssuer,
) -> Result<TokenResponse, ServerError> {
    let refresh_secret = api.issue_refresh_token(user.id).await?;
    let access = signer.issue_token(user)?;
    Ok(TokenResponse::bearer(access, refresh_secret, signer.expiry_secs()))
}

//----------------------------------------------   Carts  ----------------------------------------------------

route!(cart => Get "/carts" impl CartManagement);
pub async fn cart<C: CartManagement>(
    claims: JwtClaims,
    api: web::Data<CartApi<C>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET cart for user {}", claims.sub);
    let items = api.fetch_cart(claims.sub).await?;
    Ok(HttpResponse::Ok().json(items))
}

route!(add_cart_item => Post "/carts/items/{product_id}" impl CartManagement);
pub async fn add_cart_item<C: CartManagement>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<CartItemRequest>,
    api: web::Data<CartApi<C>>,
) -> Result<HttpResponse, ServerError> {
    let product_id = path.into_inner();
    debug!("💻️ POST cart item {product_id} for user {}", claims.sub);
    let item = api.add_item(claims.sub, product_id, body.quantity).await?;
    Ok(HttpResponse::Ok().json(item))
}

route!(update_cart_item => Patch "/carts/items/{product_id}" impl CartManagement);
pub async fn update_cart_item<C: CartManagement>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<CartItemRequest>,
    api: web::Data<CartApi<C>>,
) -> Result<HttpResponse, ServerError> {
    let product_id = path.into_inner();
    debug!("💻️ PATCH cart item {product_id} for user {}", claims.sub);
    let item = api.update_item(claims.sub, product_id, body.quantity).await?;
    Ok(HttpResponse::Ok().json(item))
}

route!(remove_cart_item => Delete "/carts/items/{product_id}" impl CartManagement);
pub async fn remove_cart_item<C: CartManagement>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<CartApi<C>>,
) -> Result<HttpResponse, ServerError> {
    let product_id = path.into_inner();
    debug!("💻️ DELETE cart item {product_id} for user {}", claims.sub);
    api.remove_item(claims.sub, product_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

//----------------------------------------------   Orders  ----------------------------------------------------
// The order flow endpoints are generic over the backend and both provider seams, which the
// `route!` macro cannot express; the server registers them manually.

/// Creates a pending order from the caller's cart, snapshotting prices and checking that the
/// shipping address belongs to them and is inside a shipping zone.
pub async fn create_order<B, P, T>(
    claims: JwtClaims,
    params: web::Query<NewOrderParams>,
    api: web::Data<OrderFlowApi<B, P, T>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement + CartManagement + CatalogManagement + ShippingManagement + 'static,
    P: PaymentProvider + 'static,
    T: TaxProvider + 'static,
{
    debug!("💻️ POST order for user {} shipping to address {}", claims.sub, params.shipping_id);
    let order = api.create_order(claims.sub, params.shipping_id).await?;
    Ok(HttpResponse::Created().json(order))
}

/// Confirms a pending order: authoritative tax is calculated, the payment intent is created and
/// attached (write-once), and the cart is cleared. Retries converge on the same intent.
pub async fn confirm_order<B, P, T>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B, P, T>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement + CartManagement + CatalogManagement + ShippingManagement + 'static,
    P: PaymentProvider + 'static,
    T: TaxProvider + 'static,
{
    let order_id = path.into_inner();
    debug!("💻️ POST order confirmation for order {order_id} by user {}", claims.sub);
    let intent = api.confirm_order(claims.sub, order_id).await?;
    Ok(HttpResponse::Ok().json(intent))
}

/// The caller's own order, with items. 404 for other people's orders so ids cannot be probed.
pub async fn my_order<B, P, T>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B, P, T>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement + CartManagement + CatalogManagement + ShippingManagement + 'static,
    P: PaymentProvider + 'static,
    T: TaxProvider + 'static,
{
    let order_id = path.into_inner();
    debug!("💻️ GET order {order_id} for user {}", claims.sub);
    let order = api
        .fetch_order_for_user(claims.sub, order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id}")))?;
    Ok(HttpResponse::Ok().json(order))
}

/// Unauthenticated order status lookup, for payment-result pages. Exposes status and totals
/// only.
pub async fn public_order<B, P, T>(
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B, P, T>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement + CartManagement + CatalogManagement + ShippingManagement + 'static,
    P: PaymentProvider + 'static,
    T: TaxProvider + 'static,
{
    let order_id = path.into_inner();
    trace!("💻️ POST public order lookup {order_id}");
    let order = api
        .fetch_order(order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id}")))?;
    Ok(HttpResponse::Ok().json(PublicOrderSummary::from(&order.order)))
}

route!(search_orders => Get "/orders" impl OrderManagement where requires [Role::Admin]);
/// Admin order search with optional filters on user, currency, intent, status and time range.
pub async fn search_orders<A: OrderManagement>(
    params: web::Query<OrderSearchParams>,
    db: web::Data<A>,
) -> Result<HttpResponse, ServerError> {
    let query = OrderQueryFilter::from(params.into_inner());
    debug!("💻️ GET order search. {query}");
    let orders = db.search_orders(query).await?;
    Ok(HttpResponse::Ok().json(orders))
}

//----------------------------------------------   Webhook  ----------------------------------------------------

/// Route handler for provider webhook deliveries.
///
/// The signature middleware has already verified the body against the signing secret, so the
/// event is authentic. Unsupported event types are acknowledged without touching any order, and
/// duplicates are acknowledged so the provider stops redelivering them; anything else would make
/// the provider retry events we have already applied.
pub async fn payment_webhook<B, P, T>(
    body: web::Bytes,
    api: web::Data<OrderFlowApi<B, P, T>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement + CartManagement + CatalogManagement + ShippingManagement + 'static,
    P: PaymentProvider + 'static,
    T: TaxProvider + 'static,
{
    let raw = std::str::from_utf8(&body).map_err(|_| {
        warn!("📬️ A webhook body was not valid UTF-8");
        ServerError::CouldNotDeserializePayload
    })?;
    let event: StripeEvent = serde_json::from_str(raw).map_err(|e| {
        warn!("📬️ Could not deserialize a webhook event. {e}");
        ServerError::CouldNotDeserializePayload
    })?;
    if !is_supported_event(&event.event_type) {
        debug!("📬️ Ignoring unsupported webhook event type {}", event.event_type);
        return Ok(HttpResponse::Ok().json(JsonResponse::new("ignored")));
    }
    let payload = payload_from_event(&event, raw);
    let outcome = api.apply_webhook_event(payload).await?;
    let message = match outcome {
        WebhookOutcome::Duplicate => "duplicate",
        WebhookOutcome::OrderNotFound => "unmatched",
        WebhookOutcome::Applied(_) => "applied",
        WebhookOutcome::Ignored(_) => "ignored",
    };
    Ok(HttpResponse::Ok().json(JsonResponse::new(message)))
}

//----------------------------------------------   Tax  ----------------------------------------------------

/// A non-authoritative tax estimate for the caller's current cart, shipped to the destination in
/// the query string (`?country=…&state=…`). The authoritative number is calculated at order
/// confirmation.
pub async fn tax_estimate<B>(
    claims: JwtClaims,
    params: web::Query<TaxEstimateParams>,
    db: web::Data<B>,
    api: web::Data<TaxApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: CartManagement + CatalogManagement + TaxRateStore + 'static,
{
    debug!("💻️ GET tax estimate for user {} to {}/{}", claims.sub, params.country, params.state.as_deref().unwrap_or("-"));
    let destination = Address {
        id: 0,
        user_id: claims.sub,
        country: params.country.trim().to_ascii_uppercase(),
        line1: String::new(),
        line2: None,
        city: String::new(),
        state: params.state.as_deref().map(|s| s.trim().to_ascii_uppercase()),
        postal_code: String::new(),
        email: None,
        created_at: Utc::now(),
    };
    let cart = db.fetch_cart(claims.sub).await?;
    let mut items = Vec::with_capacity(cart.len());
    for line in &cart {
        let Some(product) = db.fetch_product(line.product_id).await? else {
            continue;
        };
        items.push(OrderItem {
            order_id: 0,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            product_name: product.name,
            thumbnail: product.thumbnail,
            tax_code: product.tax_code,
        });
    }
    let tax_amount = api.estimate_tax(&destination, &items).await?;
    Ok(HttpResponse::Ok().json(TaxEstimateResponse { currency: DEFAULT_CURRENCY.to_string(), tax_amount }))
}

//----------------------------------------------   Shipping  ----------------------------------------------------

route!(shipping_zones => Get "/shipping/zones" impl ShippingManagement where requires [Role::Admin]);
pub async fn shipping_zones<A: ShippingManagement>(api: web::Data<ShippingApi<A>>) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET shipping zones");
    let zones = api.zones().await?;
    Ok(HttpResponse::Ok().json(zones))
}

route!(add_shipping_zone => Post "/shipping/zones" impl ShippingManagement where requires [Role::Admin]);
pub async fn add_shipping_zone<A: ShippingManagement>(
    body: web::Json<NewShippingZoneRequest>,
    api: web::Data<ShippingApi<A>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST shipping zone");
    let zone = api.add_zone(&body.country, body.state_code.as_deref(), body.postal_code.as_deref()).await?;
    Ok(HttpResponse::Created().json(zone))
}

route!(remove_shipping_zone => Delete "/shipping/zones/{id}" impl ShippingManagement where requires [Role::Admin]);
pub async fn remove_shipping_zone<A: ShippingManagement>(
    path: web::Path<i64>,
    api: web::Data<ShippingApi<A>>,
) -> Result<HttpResponse, ServerError> {
    let zone_id = path.into_inner();
    debug!("💻️ DELETE shipping zone {zone_id}");
    if api.remove_zone(zone_id).await? {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ServerError::NoRecordFound(format!("Shipping zone {zone_id}")))
    }
}

route!(shipping_exclusions => Get "/shipping/exclusions" impl ShippingManagement where requires [Role::Admin]);
pub async fn shipping_exclusions<A: ShippingManagement>(
    api: web::Data<ShippingApi<A>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET shipping exclusions");
    let exclusions = api.exclusions().await?;
    Ok(HttpResponse::Ok().json(exclusions))
}

route!(add_shipping_exclusion => Post "/shipping/exclusions" impl ShippingManagement where requires [Role::Admin]);
pub async fn add_shipping_exclusion<A: ShippingManagement>(
    body: web::Json<NewShippingExclusionRequest>,
    api: web::Data<ShippingApi<A>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST shipping exclusion");
    let exclusion = api.add_exclusion(&body.country, &body.postal_code).await?;
    Ok(HttpResponse::Created().json(exclusion))
}

route!(remove_shipping_exclusion => Delete "/shipping/exclusions/{id}" impl ShippingManagement where requires [Role::Admin]);
pub async fn remove_shipping_exclusion<A: ShippingManagement>(
    path: web::Path<i64>,
    api: web::Data<ShippingApi<A>>,
) -> Result<HttpResponse, ServerError> {
    let exclusion_id = path.into_inner();
    debug!("💻️ DELETE shipping exclusion {exclusion_id}");
    if api.remove_exclusion(exclusion_id).await? {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ServerError::NoRecordFound(format!("Shipping exclusion {exclusion_id}")))
    }
}

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use chrono::Duration;
use log::*;
use marketplace_engine::{
    events::EventProducers,
    AuthApi,
    CartApi,
    OrderFlowApi,
    RateLimitApi,
    ShippingApi,
    SqliteDatabase,
    TaxApi,
};
use stripe_tools::DEFAULT_SIGNATURE_TOLERANCE_SECS;

use crate::{
    auth::TokenIssuer,
    config::ServerConfig,
    errors::ServerError,
    integrations::StripeGateway,
    middleware::{RateLimitMiddlewareFactory, SignatureMiddlewareFactory},
    routes::{
        add_cart_item,
        confirm_order,
        create_order,
        guest_session,
        health,
        my_order,
        password_reset,
        payment_webhook,
        public_order,
        register,
        tax_estimate,
        AddCartItemRoute,
        AddShippingExclusionRoute,
        AddShippingZoneRoute,
        CartRoute,
        ConfirmPasswordResetRoute,
        ConfirmRegisterRoute,
        LoginRoute,
        RefreshTokenRoute,
        RemoveCartItemRoute,
        RemoveShippingExclusionRoute,
        RemoveShippingZoneRoute,
        SearchOrdersRoute,
        ShippingExclusionsRoute,
        ShippingZonesRoute,
        UpdateCartItemRoute,
    },
    scheduler::start_scheduler,
};

/// Request bodies larger than this are rejected outright. No legitimate payload on this API comes
/// close.
const MAX_BODY_SIZE: usize = 65_536;

/// How long workers get to finish in-flight requests on shutdown.
const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let payment = StripeGateway::new(config.stripe.clone())?;
    let _scheduler = start_scheduler(
        db.clone(),
        payment.clone(),
        config.auth.hmac_secret.clone(),
        config.auth.refresh_token_expiry,
        config.order_ttl,
    );
    let srv = create_server_instance(config, db, payment)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    payment: StripeGateway,
) -> Result<Server, ServerError> {
    let read_timeout = config.read_timeout;
    let write_timeout = config.write_timeout;
    let idle_timeout = config.idle_timeout;
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let orders_api =
            OrderFlowApi::new(db.clone(), payment.clone(), payment.clone(), EventProducers::default());
        let auth_api = AuthApi::new(
            db.clone(),
            config.auth.hmac_secret.clone(),
            config.auth.refresh_token_expiry,
            EventProducers::default(),
        );
        let cart_api = CartApi::new(db.clone());
        let shipping_api = ShippingApi::new(db.clone());
        let tax_api = TaxApi::new(db.clone());
        let rate_limit_api = RateLimitApi::new(db.clone());
        let jwt_signer = TokenIssuer::new(&config.auth);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mps::access_log"))
            .app_data(web::JsonConfig::default().limit(MAX_BODY_SIZE))
            .app_data(web::PayloadConfig::default().limit(MAX_BODY_SIZE))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(auth_api))
            .app_data(web::Data::new(cart_api))
            .app_data(web::Data::new(shipping_api))
            .app_data(web::Data::new(tax_api))
            .app_data(web::Data::new(rate_limit_api))
            .app_data(web::Data::new(jwt_signer))
            .app_data(web::Data::new(db.clone()));
        // Routes that require authentication. The ACL middleware on the admin routes rejects
        // non-admin tokens; everything else in the scope only needs a valid access token, which
        // the JwtClaims extractor enforces per handler.
        // The order search route carries a resource-level Get guard, so it can share the
        // `/orders` path with the POST resource below; requests fall through to whichever
        // resource's guard matches.
        let auth_scope = web::scope("/api")
            .service(CartRoute::<SqliteDatabase>::new())
            .service(AddCartItemRoute::<SqliteDatabase>::new())
            .service(UpdateCartItemRoute::<SqliteDatabase>::new())
            .service(RemoveCartItemRoute::<SqliteDatabase>::new())
            .service(SearchOrdersRoute::<SqliteDatabase>::new())
            .service(
                web::resource("/orders")
                    .guard(actix_web::guard::Post())
                    .wrap(RateLimitMiddlewareFactory::<SqliteDatabase>::new("create_order", 5, Duration::hours(1)))
                    .route(web::post().to(create_order::<SqliteDatabase, StripeGateway, StripeGateway>)),
            )
            .service(
                web::resource("/orders/{id}/confirm")
                    .guard(actix_web::guard::Post())
                    .wrap(RateLimitMiddlewareFactory::<SqliteDatabase>::new("confirm_order", 5, Duration::hours(1)))
                    .route(web::post().to(confirm_order::<SqliteDatabase, StripeGateway, StripeGateway>)),
            )
            .service(
                web::resource("/orders/{id}/owner")
                    .guard(actix_web::guard::Get())
                    .route(web::get().to(my_order::<SqliteDatabase, StripeGateway, StripeGateway>)),
            )
            .service(
                web::resource("/tax/estimate")
                    .guard(actix_web::guard::Get())
                    .route(web::get().to(tax_estimate::<SqliteDatabase>)),
            )
            .service(ShippingZonesRoute::<SqliteDatabase>::new())
            .service(AddShippingZoneRoute::<SqliteDatabase>::new())
            .service(RemoveShippingZoneRoute::<SqliteDatabase>::new())
            .service(ShippingExclusionsRoute::<SqliteDatabase>::new())
            .service(AddShippingExclusionRoute::<SqliteDatabase>::new())
            .service(RemoveShippingExclusionRoute::<SqliteDatabase>::new());
        let webhook_scope = web::scope("/payment").service(
            web::resource("/events")
                .guard(actix_web::guard::Post())
                .wrap(SignatureMiddlewareFactory::new(
                    config.stripe.webhook_signing_secret.clone(),
                    DEFAULT_SIGNATURE_TOLERANCE_SECS,
                ))
                .route(web::post().to(payment_webhook::<SqliteDatabase, StripeGateway, StripeGateway>)),
        );
        app.service(health)
            .service(
                web::resource("/register")
                    .guard(actix_web::guard::Post())
                    .wrap(RateLimitMiddlewareFactory::<SqliteDatabase>::new("register", 2, Duration::hours(1)))
                    .route(web::post().to(register::<SqliteDatabase>)),
            )
            .service(ConfirmRegisterRoute::<SqliteDatabase>::new())
            .service(
                web::resource("/users/guest")
                    .guard(actix_web::guard::Post())
                    .wrap(RateLimitMiddlewareFactory::<SqliteDatabase>::new("guest_session", 5, Duration::hours(1)))
                    .route(web::post().to(guest_session::<SqliteDatabase>)),
            )
            .service(LoginRoute::<SqliteDatabase>::new())
            .service(RefreshTokenRoute::<SqliteDatabase>::new())
            .service(
                web::resource("/users/password-reset")
                    .guard(actix_web::guard::Post())
                    .wrap(RateLimitMiddlewareFactory::<SqliteDatabase>::new("password_reset", 3, Duration::hours(1)))
                    .route(web::post().to(password_reset::<SqliteDatabase>)),
            )
            .service(ConfirmPasswordResetRoute::<SqliteDatabase>::new())
            .service(
                web::resource("/orders/{id}/public")
                    .guard(actix_web::guard::Post())
                    .route(web::post().to(public_order::<SqliteDatabase, StripeGateway, StripeGateway>)),
            )
            .service(webhook_scope)
            .service(auth_scope)
    })
    .keep_alive(KeepAlive::Timeout(idle_timeout))
    .client_request_timeout(read_timeout)
    .client_disconnect_timeout(write_timeout)
    .shutdown_timeout(SHUTDOWN_TIMEOUT_SECS)
    .bind((host.as_str(), port))?
    .run();
    info!("🚀️ Marketplace server listening on {host}:{port}");
    Ok(srv)
}

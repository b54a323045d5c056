use twitch_chatters::app;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    app::init_logger();
    app::start_proxy().await
}

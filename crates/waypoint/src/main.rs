#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lib_waypoint::init().await
}

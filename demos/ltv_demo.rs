use std::error::Error;

#[path = "common/local_service.rs"]
mod local_service;

fn main() -> Result<(), Box<dyn Error>> {
    ltv_pipeline::example_apps::run_ltv_demo(
        std::env::args().skip(1),
        Box::new(local_service::seed_demo_store),
        local_service::LocalService::new,
    )
}

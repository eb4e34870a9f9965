//! End-to-end demo against a local sled database: seed the menu, place an
//! order, run the payment code through verification and fulfil it.
use canteen_orders::order::LineItem;
use canteen_orders::{CanteenService, SledStore};

fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let store = SledStore::open("canteen-demo-db")?;
    store.ensure_init()?;
    let service = CanteenService::new(store);

    let events = service.subscribe();

    let menu = service.list_menu()?;
    println!("menu:");
    for item in &menu {
        println!("  {} - {}", item.name, item.price);
    }

    let cart: Vec<LineItem> = menu
        .iter()
        .take(2)
        .map(|it| LineItem::new(it.id.clone(), it.name.clone(), it.price, 2))
        .collect();

    let order = service.place_order("S1234", cart)?;
    println!("placed {} [{}] total {}", order.id, order.status, order.total);

    let order = service.request_payment_code(&order.id)?;
    let code = order.payment_code.clone().expect("code was just assigned");
    println!("payment code: {code}");

    let order = service.verify_payment_code(code.as_str())?;
    println!("verified {} [{}]", order.id, order.status);

    let order = service.fulfill_order(&order.id)?;
    println!("fulfilled {} [{}]", order.id, order.status);

    while let Ok(event) = events.try_recv() {
        println!("change: {:?} {}", event.kind, event.id);
    }

    service.store().flush()?;
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use dispatch_core::ErrorKind;
use dispatch_domain::{
    DroneStatus, DroneStatusObserver, MessageBus, OrderStatus, Position,
    ORDER_CREATED_ROUTING_KEY,
};
use dispatch_dispatcher::{
    DispatcherService, DroneService, HeartbeatMonitor, HeartbeatMonitorConfig, OrderDispatchWorker,
    OrderService, RecoveryHandler,
};
use dispatch_infrastructure::InMemoryMessageBus;
use dispatch_testing_utils::{
    MockDroneRepository, MockLivenessCache, MockOrderRepository, RecordingObserver,
};

struct System {
    drones: MockDroneRepository,
    orders: MockOrderRepository,
    cache: MockLivenessCache,
    drone_service: Arc<DroneService>,
    order_service: OrderService,
    dispatcher: Arc<DispatcherService>,
}

fn system(bus: Option<Arc<dyn MessageBus>>, extra: Vec<Arc<dyn DroneStatusObserver>>) -> System {
    let drones = MockDroneRepository::new();
    let orders = MockOrderRepository::new();
    let cache = MockLivenessCache::new();

    let mut observers: Vec<Arc<dyn DroneStatusObserver>> =
        vec![Arc::new(RecoveryHandler::new(Arc::new(orders.clone())))];
    observers.extend(extra);

    let drone_service = Arc::new(DroneService::new(
        Arc::new(drones.clone()),
        Some(Arc::new(cache.clone())),
        observers,
        None,
    ));
    let order_service = OrderService::new(
        Arc::new(orders.clone()),
        Arc::clone(&drone_service),
        bus,
        None,
    );
    let dispatcher = Arc::new(DispatcherService::new(
        Arc::clone(&drone_service),
        Arc::new(orders.clone()),
    ));

    System {
        drones,
        orders,
        cache,
        drone_service,
        order_service,
        dispatcher,
    }
}

#[tokio::test]
async fn test_broken_drone_returns_order_to_pool() {
    let observer = RecordingObserver::new("audit");
    let s = system(None, vec![Arc::new(observer.clone())]);

    let order = s
        .order_service
        .create_order(Position::new(10.0, 10.0), Position::new(20.0, 20.0))
        .await
        .unwrap();
    let d1 = s.drone_service.register_drone("D1").await.unwrap();

    let reserved = s.dispatcher.reserve_job(d1.id).await.unwrap();
    assert_eq!(reserved.id, order.id);
    assert_eq!(reserved.drone_id, Some(d1.id));

    s.order_service
        .transition(order.id, OrderStatus::PickedUp)
        .await
        .unwrap();
    s.drone_service
        .update_location(d1.id, Position::new(15.0, 12.0))
        .await
        .unwrap();
    s.drone_service
        .update_status(d1.id, DroneStatus::Broken)
        .await
        .unwrap();

    let recovered = s.order_service.get_order(order.id).await.unwrap();
    assert_eq!(recovered.status, OrderStatus::Pending);
    assert_eq!(recovered.drone_id, None);
    assert_eq!(recovered.origin, Position::new(15.0, 12.0));
    assert_eq!(recovered.destination, Position::new(20.0, 20.0));

    let records = observer.records();
    assert_eq!(records.last().unwrap().new_status, DroneStatus::Broken);

    // 另一架无人机可以接手
    let d2 = s.drone_service.register_drone("D2").await.unwrap();
    let retaken = s.dispatcher.reserve_job(d2.id).await.unwrap();
    assert_eq!(retaken.id, order.id);
    assert_eq!(retaken.origin, Position::new(15.0, 12.0));
}

#[tokio::test]
async fn test_busy_drone_cannot_take_second_order() {
    let s = system(None, vec![]);
    s.order_service
        .create_order(Position::new(1.0, 1.0), Position::new(2.0, 2.0))
        .await
        .unwrap();
    let second = s
        .order_service
        .create_order(Position::new(3.0, 3.0), Position::new(4.0, 4.0))
        .await
        .unwrap();
    let d1 = s.drone_service.register_drone("D1").await.unwrap();

    s.dispatcher.reserve_job(d1.id).await.unwrap();
    let err = s.dispatcher.reserve_job(d1.id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(
        s.orders.get(second.id).unwrap().status,
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn test_idle_drone_with_nothing_to_do() {
    let s = system(None, vec![]);
    let d1 = s.drone_service.register_drone("D1").await.unwrap();

    let err = s.dispatcher.reserve_job(d1.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(s.drones.get(d1.id).unwrap().status, DroneStatus::Idle);
}

#[tokio::test]
async fn test_delivery_completes_and_frees_drone() {
    let s = system(None, vec![]);
    let order = s
        .order_service
        .create_order(Position::new(1.0, 1.0), Position::new(2.0, 2.0))
        .await
        .unwrap();
    let d1 = s.drone_service.register_drone("D1").await.unwrap();

    s.dispatcher.reserve_job(d1.id).await.unwrap();
    s.order_service
        .transition(order.id, OrderStatus::PickedUp)
        .await
        .unwrap();
    s.order_service
        .transition(order.id, OrderStatus::Delivered)
        .await
        .unwrap();

    assert_eq!(s.drones.get(d1.id).unwrap().status, DroneStatus::Idle);
    let err = s
        .order_service
        .transition(order.id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_silent_drone_goes_offline_without_recovery() {
    let s = system(None, vec![]);
    let order = s
        .order_service
        .create_order(Position::new(1.0, 1.0), Position::new(2.0, 2.0))
        .await
        .unwrap();
    let d1 = s.drone_service.register_drone("D1").await.unwrap();
    s.drone_service
        .update_location(d1.id, Position::new(1.5, 1.5))
        .await
        .unwrap();
    s.dispatcher.reserve_job(d1.id).await.unwrap();

    let monitor = HeartbeatMonitor::new(
        Arc::clone(&s.drone_service),
        Arc::new(s.cache.clone()),
        Some(HeartbeatMonitorConfig {
            scan_interval: Duration::from_millis(20),
            check_timeout: Duration::from_millis(50),
        }),
    );
    let (_tx, mut rx) = broadcast::channel(1);

    let report = monitor.scan_once(&mut rx).await.unwrap();
    assert_eq!(report.marked_offline, 0);

    s.cache.expire_heartbeat(d1.id);
    let report = monitor.scan_once(&mut rx).await.unwrap();
    assert_eq!(report.marked_offline, 1);

    assert_eq!(s.drones.get(d1.id).unwrap().status, DroneStatus::Offline);
    let stored = s.orders.get(order.id).unwrap();
    assert_eq!(stored.status, OrderStatus::Reserved);
    assert_eq!(stored.drone_id, Some(d1.id));
}

#[tokio::test]
async fn test_order_event_dispatched_through_in_memory_bus() {
    let bus = Arc::new(InMemoryMessageBus::new(Duration::from_millis(20)));
    let s = system(Some(bus.clone() as Arc<dyn MessageBus>), vec![]);

    let worker = Arc::new(OrderDispatchWorker::new(
        Arc::clone(&s.drone_service),
        Arc::clone(&s.dispatcher),
        bus.clone(),
        "order_dispatch_queue",
        ORDER_CREATED_ROUTING_KEY,
    ));
    worker.start().await.unwrap();

    // 还没有空闲无人机，消息会被重新投递直到有无人机注册
    let order = s
        .order_service
        .create_order(Position::new(10.0, 10.0), Position::new(20.0, 20.0))
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(
        s.orders.get(order.id).unwrap().status,
        OrderStatus::Pending
    );

    let d1 = s.drone_service.register_drone("D1").await.unwrap();

    timeout(Duration::from_secs(2), async {
        while s.orders.get(order.id).unwrap().status != OrderStatus::Reserved {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("order was not dispatched");

    assert_eq!(s.orders.get(order.id).unwrap().drone_id, Some(d1.id));
    assert_eq!(s.drones.get(d1.id).unwrap().status, DroneStatus::Delivering);
    bus.close().await.unwrap();
}

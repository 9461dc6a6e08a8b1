//! 请求调度集成测试
//!
//! 验证两级预算、在途去重、防抖与滚动唤醒

use std::time::Duration;

use reader_overlay::dom::remove_child;
use reader_overlay::overlay::UnitId;

mod common;

use common::{HtmlTestHelper, MockService, TestEngine};

/// 当前视口 10 个、预读 10 个单元时，本轮发出 8 + 4 个请求
#[tokio::test]
async fn test_pass_respects_both_caps() {
    let html = HtmlTestHelper::paragraphs(20);
    let mut t = TestEngine::new(&html, MockService::new());
    assert_eq!(t.observe(), 20);

    // b1..b10 位于当前视口且顺序倒置，b11..b20 位于预读区
    let tops: Vec<f32> = (0..20)
        .map(|i| if i < 10 { (9 - i) as f32 * 10.0 } else { 100.0 + (i - 10) as f32 * 10.0 })
        .collect();
    t.place(&tops);

    t.engine.set_mode("bilingual");

    let in_flight: Vec<u64> = (1..=20)
        .filter(|&n| t.engine.cache().is_in_flight(UnitId(n)))
        .collect();
    assert_eq!(in_flight, (3..=14).collect::<Vec<u64>>());
    assert_eq!(t.engine.stats().requests_current, 8);
    assert_eq!(t.engine.stats().requests_lookahead, 4);

    t.engine.run_until_idle().await;
    assert_eq!(t.engine.cache().len(), 12);

    // 下一轮补齐剩余单元
    t.engine.request_for_viewport(true);
    assert_eq!(t.engine.stats().requests_current, 10);
    assert_eq!(t.engine.stats().requests_lookahead, 10);

    t.engine.run_until_idle().await;
    assert_eq!(t.engine.cache().len(), 20);
    assert_eq!(t.service.total_calls(), 20);

    println!("✅ Two-level cap test passed");
}

/// 同一单元同时最多一个在途请求
#[tokio::test(start_paused = true)]
async fn test_at_most_one_request_in_flight() {
    let service = MockService::new().with_delay(Duration::from_millis(50));
    let mut t = TestEngine::new("<p>The cat sat.</p>", service);
    t.observe();
    t.place(&[0.0]);

    t.engine.set_mode("translation-only");
    for _ in 0..3 {
        t.engine.request_for_viewport(true);
    }
    t.engine.run_until_idle().await;

    assert_eq!(t.service.total_calls(), 1);
    assert!(t.engine.cache().has(UnitId(1)));

    // 已缓存的单元不再请求
    t.engine.request_for_viewport(true);
    t.engine.run_until_idle().await;
    assert_eq!(t.service.total_calls(), 1);

    println!("✅ In-flight dedup test passed");
}

/// 连续的非立即触发合并为一次扫描
#[tokio::test(start_paused = true)]
async fn test_debounce_coalesces_triggers() {
    let html = HtmlTestHelper::paragraphs(3);
    let mut t = TestEngine::new(&html, MockService::new());
    t.observe();

    // 尚无几何信息，启用时的立即扫描不会发出请求
    t.engine.set_mode("bilingual");
    assert_eq!(t.engine.stats().scans, 1);
    assert_eq!(t.service.total_calls(), 0);

    t.place(&[0.0, 20.0, 40.0]);
    for _ in 0..3 {
        t.engine.request_for_viewport(false);
    }
    assert!(t.engine.has_pending_scan());
    assert_eq!(t.engine.stats().scans, 1);

    t.engine.run_until_idle().await;

    assert_eq!(t.engine.stats().scans, 2);
    assert_eq!(t.service.total_calls(), 3);
    assert!(!t.engine.has_pending_scan());

    println!("✅ Debounce coalescing test passed");
}

/// 切换到关闭模式取消待触发的扫描
#[tokio::test(start_paused = true)]
async fn test_entering_off_cancels_pending_scan() {
    let mut t = TestEngine::new("<p>The cat sat.</p>", MockService::new());
    t.observe();
    t.engine.set_mode("bilingual");

    t.place(&[0.0]);
    t.engine.request_for_viewport(false);
    assert!(t.engine.has_pending_scan());

    t.engine.set_mode("off");
    assert!(!t.engine.has_pending_scan());

    tokio::time::sleep(Duration::from_millis(500)).await;
    t.engine.drain_events();

    assert_eq!(t.engine.stats().scans, 1);
    assert_eq!(t.service.total_calls(), 0);

    // 关闭模式下的请求被忽略
    t.engine.request_for_viewport(true);
    assert_eq!(t.service.total_calls(), 0);

    println!("✅ Off cancels pending scan test passed");
}

/// 滚动后新进入边界的单元被请求
#[tokio::test(start_paused = true)]
async fn test_scroll_wakes_scan() {
    let html = HtmlTestHelper::paragraphs(20);
    let mut t = TestEngine::new(&html, MockService::new());
    t.observe();
    let tops: Vec<f32> = (0..20).map(|i| i as f32 * 100.0).collect();
    t.place(&tops);

    t.engine.set_mode("bilingual");
    t.engine.run_until_idle().await;
    assert_eq!(
        t.service.text_calls(),
        vec!["Paragraph number 1.".to_string(), "Paragraph number 2.".to_string()]
    );

    t.layout.scroll_to(1000.0);
    t.engine.notify_scroll();
    assert!(t.engine.has_pending_scan());

    t.engine.run_until_idle().await;
    let calls = t.service.text_calls();
    assert_eq!(calls.len(), 4);
    assert!(calls.contains(&"Paragraph number 11.".to_string()));
    assert!(calls.contains(&"Paragraph number 12.".to_string()));

    println!("✅ Scroll wake test passed");
}

/// 预读窗口之外的单元不被请求
#[tokio::test]
async fn test_lookahead_limit() {
    let html = HtmlTestHelper::paragraphs(20);
    let mut t = TestEngine::new(&html, MockService::new());
    t.observe();
    let tops: Vec<f32> = (0..20).map(|i| i as f32 * 20.0).collect();
    t.place(&tops);

    t.engine.set_mode("bilingual");

    let in_flight: Vec<u64> = (1..=20)
        .filter(|&n| t.engine.cache().is_in_flight(UnitId(n)))
        .collect();
    assert_eq!(in_flight, (1..=10).collect::<Vec<u64>>());
    assert_eq!(t.engine.stats().requests_current, 5);
    assert_eq!(t.engine.stats().requests_lookahead, 5);

    t.engine.run_until_idle().await;
    assert_eq!(t.engine.cache().len(), 10);

    println!("✅ Lookahead limit test passed");
}

/// 宿主推送的空结果不会清除仍在途的请求
#[tokio::test(start_paused = true)]
async fn test_empty_push_keeps_request_in_flight() {
    let service = MockService::new()
        .respond("The cat sat.", "El gato se sentó.")
        .with_delay(Duration::from_millis(50));
    let mut t = TestEngine::new("<p>The cat sat.</p>", service);
    t.observe();
    t.place(&[0.0]);

    t.engine.set_mode("translation-only");
    assert!(!t.engine.apply_result_by_id("b1", ""));
    assert!(t.engine.cache().is_in_flight(UnitId(1)));

    t.engine.request_for_viewport(true);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(t.service.total_calls(), 1);

    t.engine.run_until_idle().await;
    assert!(t.engine.cache().has(UnitId(1)));
    assert_eq!(t.service.total_calls(), 1);

    println!("✅ Empty push in-flight test passed");
}

/// 翻译任务 panic 时清除在途标记，下次扫描重新请求
#[tokio::test]
async fn test_panicking_request_is_released_and_retried() {
    let service = MockService::new()
        .respond("The cat sat.", "El gato se sentó.")
        .panic_times(1);
    let mut t = TestEngine::new("<p>The cat sat.</p>", service);
    t.observe();
    t.place(&[0.0]);

    t.engine.set_mode("translation-only");
    t.engine.run_until_idle().await;

    assert!(!t.engine.cache().is_in_flight(UnitId(1)));
    assert!(!t.engine.cache().has(UnitId(1)));
    assert_eq!(t.engine.stats().failures, 1);

    t.engine.request_for_viewport(true);
    t.engine.run_until_idle().await;

    assert!(t.engine.cache().has(UnitId(1)));
    assert_eq!(t.service.text_calls().len(), 2);

    println!("✅ Panicking request test passed");
}

/// 被宿主移除的单元在下一次扫描时被清理
#[tokio::test]
async fn test_removed_unit_is_pruned() {
    let html = HtmlTestHelper::paragraphs(3);
    let mut t = TestEngine::new(&html, MockService::new());
    t.observe();
    t.place(&[0.0, 20.0, 40.0]);

    t.engine.set_mode("bilingual");
    t.engine.run_until_idle().await;
    assert_eq!(t.engine.cache().len(), 3);

    {
        let body = HtmlTestHelper::body(&t.dom);
        let second = t.element("p", 1);
        remove_child(&body, &second);
    }
    t.layout.remove_rect(UnitId(2));

    t.engine.request_for_viewport(true);

    assert_eq!(t.engine.registry().ids(), &[UnitId(1), UnitId(3)]);
    assert!(!t.engine.cache().has(UnitId(2)));
    assert_eq!(t.engine.stats().units_detached, 1);

    t.engine.notify_scroll();
    t.engine.request_for_viewport(true);
    assert_eq!(t.engine.stats().units_detached, 1);
    assert_eq!(t.service.total_calls(), 3);

    println!("✅ Detached unit pruning test passed");
}

/// 视口变高后新进入窗口的单元被请求
#[tokio::test(start_paused = true)]
async fn test_resize_extends_window() {
    let html = HtmlTestHelper::paragraphs(4);
    let mut t = TestEngine::new(&html, MockService::new());
    t.observe();
    t.place(&[0.0, 150.0, 250.0, 350.0]);

    t.engine.set_mode("bilingual");
    t.engine.run_until_idle().await;
    assert_eq!(t.service.total_calls(), 2);

    t.layout.set_viewport_height(200.0);
    t.engine.notify_scroll();
    assert!(t.engine.has_pending_scan());

    t.engine.run_until_idle().await;
    assert_eq!(t.service.total_calls(), 4);
    assert_eq!(t.engine.cache().len(), 4);

    println!("✅ Resize test passed");
}

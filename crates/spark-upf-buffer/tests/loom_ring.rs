#![cfg(any(loom, spark_loom))]

use loom::{model::Builder, sync::Arc, thread};
use spark_upf_buffer::MpscRing;

/// 限定抢占次数的模型检查器；生产者之间的发布等待是自旋，不设上限时分支数会爆炸。
fn bounded_model<F>(f: F)
where
    F: Fn() + Sync + Send + 'static,
{
    let mut builder = Builder::new();
    builder.preemption_bound = Some(3);
    builder.check(f);
}

#[test]
#[allow(unsafe_code)]
fn concurrent_producers_publish_in_reservation_order() {
    //
    // 教案级说明：验证两个生产者并发批量写入时，消费者观察到的序列满足预留顺序发布。
    // - **Why**：后预留的生产者必须等待前驱发布，否则消费者可能读到尚未写入的槽位；
    // - **How**：容量 4 恰好容纳两个两元素批次，生产者各写一次；消费者在生产者运行期间尝试一次出队，
    //   汇合后再取走剩余元素；
    // - **What**：并发出队只能看到已发布的完整前缀；两批各自连续有序，总数不丢失、不重复。
    bounded_model(|| {
        let ring = Arc::new(MpscRing::try_with_capacity(4).expect("分配环形缓冲"));

        let producers: Vec<_> = [[10u32, 11], [20, 21]]
            .into_iter()
            .map(|batch| {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    let rejected = ring.push_batch(batch.to_vec());
                    assert!(rejected.is_empty(), "容量足够时不应拒绝");
                })
            })
            .collect();

        let mut received = Vec::new();
        // SAFETY: 主线程是唯一的消费者。
        let early = unsafe { ring.pop_burst(4, &mut received) };
        assert!(early == 0 || early == 2 || early == 4, "只能看到整批发布: {received:?}");

        for producer in producers {
            producer.join().expect("生产者线程不应 panic");
        }
        // SAFETY: 生产者均已退出，主线程仍是唯一的消费者。
        unsafe {
            ring.pop_burst(4, &mut received);
        }

        assert_eq!(received.len(), 4);
        for pair in received.chunks(2) {
            assert_eq!(pair[1], pair[0] + 1, "同一批次必须连续且有序: {received:?}");
        }
        assert!(ring.is_empty());
    });
}

#[test]
#[allow(unsafe_code)]
fn consumer_frees_slots_for_a_wrapping_producer() {
    bounded_model(|| {
        let ring = Arc::new(MpscRing::try_with_capacity(2).expect("分配环形缓冲"));
        assert!(ring.push_batch(vec![1u32, 2]).is_empty());

        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.push_batch(vec![3]))
        };

        let mut received = Vec::new();
        // SAFETY: 主线程是唯一的消费者。
        unsafe {
            ring.pop_burst(1, &mut received);
        }
        let rejected = producer.join().expect("生产者线程不应 panic");
        // SAFETY: 同上。
        unsafe {
            ring.pop_burst(2, &mut received);
        }

        if rejected.is_empty() {
            assert_eq!(received, vec![1, 2, 3]);
        } else {
            // 生产者先于出队看到满队，整批原样退回。
            assert_eq!(rejected, vec![3]);
            assert_eq!(received, vec![1, 2]);
        }
        assert!(ring.is_empty());
    });
}

// crates/gl_foundation/src/comm.rs

//! 进程内 SPMD 通信层
//!
//! 每个 worker 拥有网格的一个分块，worker 之间只在集合点交换数据：
//! 幽灵层交换、冰山检测前后的 gather/scatter、全局规约以及并行区段的失败共识。
//!
//! # 实现
//!
//! - [`SerialComm`]: 单 worker，所有集合操作退化为本地操作
//! - [`ThreadComm`]: 同一进程内的 worker 组，成员运行在作用域线程上，
//!   通过可中止的屏障和共享槽位同步；任一成员 panic 时整组中止
//!
//! # 示例
//!
//! ```
//! use gl_foundation::comm::{CommExt, ThreadComm};
//!
//! let sums = ThreadComm::run(4, |comm| comm.sum_f64(comm.rank() as f64));
//! assert_eq!(sums, vec![6.0; 4]);
//! ```

use crate::error::{GlError, GlResult};
use bytemuck::Pod;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

// ============================================================================
// 通信器 trait
// ============================================================================

/// 通信器
///
/// 所有方法都是集合操作：组内每个 worker 必须以相同顺序调用。
pub trait Communicator: Send + Sync + fmt::Debug {
    /// 当前 worker 编号
    fn rank(&self) -> usize;

    /// worker 总数
    fn size(&self) -> usize;

    /// 同步屏障
    fn barrier(&self);

    /// 全收集：返回按 rank 排列的所有 worker 的数据
    fn all_gather_bytes(&self, local: Vec<u8>) -> Vec<Vec<u8>>;

    /// 收集到根：仅在 `root` 上返回 `Some`
    fn gather_bytes(&self, root: usize, local: Vec<u8>) -> Option<Vec<Vec<u8>>> {
        let all = self.all_gather_bytes(local);
        (self.rank() == root).then_some(all)
    }

    /// 从根分发：根提供每个 worker 一份数据，返回本 worker 的那份
    fn scatter_bytes(&self, root: usize, parts: Option<Vec<Vec<u8>>>) -> Vec<u8>;
}

// ============================================================================
// 规约扩展
// ============================================================================

/// 基于字节集合操作的类型化规约
pub trait CommExt: Communicator {
    /// 收集每个 worker 的一个值
    fn all_gather_value<T: Pod>(&self, value: T) -> Vec<T> {
        self.all_gather_bytes(bytemuck::bytes_of(&value).to_vec())
            .iter()
            .map(|bytes| bytemuck::pod_read_unaligned(bytes))
            .collect()
    }

    /// 全局求和
    fn sum_f64(&self, value: f64) -> f64 {
        self.all_gather_value(value).into_iter().sum()
    }

    /// 全局最大值
    fn max_f64(&self, value: f64) -> f64 {
        self.all_gather_value(value)
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// 全局最小值
    fn min_f64(&self, value: f64) -> f64 {
        self.all_gather_value(value)
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    }

    /// 全局整数求和
    fn sum_u64(&self, value: u64) -> u64 {
        self.all_gather_value(value).into_iter().sum()
    }

    /// 任一 worker 为真
    fn any(&self, flag: bool) -> bool {
        self.all_gather_value(u8::from(flag))
            .into_iter()
            .any(|f| f != 0)
    }
}

impl<C: Communicator + ?Sized> CommExt for C {}

// ============================================================================
// 单 worker
// ============================================================================

/// 单 worker 通信器
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl SerialComm {
    /// 创建共享的单 worker 通信器
    pub fn shared() -> Arc<dyn Communicator> {
        Arc::new(SerialComm)
    }
}

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn all_gather_bytes(&self, local: Vec<u8>) -> Vec<Vec<u8>> {
        vec![local]
    }

    fn gather_bytes(&self, _root: usize, local: Vec<u8>) -> Option<Vec<Vec<u8>>> {
        Some(vec![local])
    }

    fn scatter_bytes(&self, _root: usize, parts: Option<Vec<Vec<u8>>>) -> Vec<u8> {
        parts.and_then(|p| p.into_iter().next()).unwrap_or_default()
    }
}

// ============================================================================
// 线程组
// ============================================================================

/// 其他成员 panic 后，仍在集合点等待的成员以此为 payload 中止
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupAborted;

#[derive(Default)]
struct BarrierState {
    count: usize,
    generation: u64,
    poisoned: bool,
}

/// 可中止的屏障
///
/// 中止后，正在等待和之后到达的成员都以 [`GroupAborted`] panic。
struct GroupBarrier {
    size: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl GroupBarrier {
    fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(BarrierState::default()),
            cvar: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut state = self.state.lock();
        if state.poisoned {
            drop(state);
            panic::panic_any(GroupAborted);
        }
        state.count += 1;
        if state.count == self.size {
            state.count = 0;
            state.generation += 1;
            self.cvar.notify_all();
            return;
        }
        let generation = state.generation;
        while state.generation == generation && !state.poisoned {
            self.cvar.wait(&mut state);
        }
        if state.generation == generation {
            drop(state);
            panic::panic_any(GroupAborted);
        }
    }

    fn poison(&self) {
        self.state.lock().poisoned = true;
        self.cvar.notify_all();
    }
}

struct Shared {
    barrier: GroupBarrier,
    slots: Mutex<Vec<Vec<u8>>>,
}

/// 线程组通信器的一个成员
pub struct ThreadComm {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl ThreadComm {
    /// 创建 `size` 个成员，成员 `r` 的 rank 为 `r`
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            barrier: GroupBarrier::new(size),
            slots: Mutex::new(vec![Vec::new(); size]),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// 在 `size` 个作用域线程上运行 `f`，按 rank 返回结果
    ///
    /// 某个 worker panic 时整组中止：其余 worker 在下一个集合点退出，
    /// 所有线程结束后重新抛出最先发生的 panic。
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(Arc<dyn Communicator>) -> R + Sync,
        R: Send,
    {
        let members = Self::group(size);
        let f = &f;
        let outcomes: Vec<Result<R, Box<dyn Any + Send>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = members
                .into_iter()
                .map(|member| {
                    let shared = Arc::clone(&member.shared);
                    let comm: Arc<dyn Communicator> = Arc::new(member);
                    scope.spawn(move || {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(comm)));
                        if outcome.is_err() {
                            shared.barrier.poison();
                        }
                        outcome
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(Err))
                .collect()
        });

        let mut results = Vec::with_capacity(outcomes.len());
        let mut origin = None;
        let mut aborted = None;
        for outcome in outcomes {
            match outcome {
                Ok(r) => results.push(r),
                Err(payload) if payload.is::<GroupAborted>() => {
                    if aborted.is_none() {
                        aborted = Some(payload);
                    }
                }
                Err(payload) => {
                    if origin.is_none() {
                        origin = Some(payload);
                    }
                }
            }
        }
        if let Some(payload) = origin.or(aborted) {
            panic::resume_unwind(payload);
        }
        results
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn all_gather_bytes(&self, local: Vec<u8>) -> Vec<Vec<u8>> {
        self.shared.slots.lock()[self.rank] = local;
        self.shared.barrier.wait();
        let all = self.shared.slots.lock().clone();
        // 所有成员读取完成后才允许下一次写入
        self.shared.barrier.wait();
        all
    }

    fn gather_bytes(&self, root: usize, local: Vec<u8>) -> Option<Vec<Vec<u8>>> {
        self.shared.slots.lock()[self.rank] = local;
        self.shared.barrier.wait();
        let all = if self.rank == root {
            let mut slots = self.shared.slots.lock();
            Some(std::mem::replace(&mut *slots, vec![Vec::new(); self.size]))
        } else {
            None
        };
        self.shared.barrier.wait();
        all
    }

    fn scatter_bytes(&self, root: usize, parts: Option<Vec<Vec<u8>>>) -> Vec<u8> {
        if self.rank == root {
            let mut parts = parts.unwrap_or_default();
            parts.resize(self.size, Vec::new());
            *self.shared.slots.lock() = parts;
        }
        self.shared.barrier.wait();
        let mine = std::mem::take(&mut self.shared.slots.lock()[self.rank]);
        self.shared.barrier.wait();
        mine
    }
}

// ============================================================================
// 并行区段
// ============================================================================

/// 运行一个可能失败的本地区段，并在所有 worker 间达成失败共识
///
/// 本地失败时返回本地错误；本地成功但其他 worker 失败时返回
/// [`GlError::RemoteFailure`]。所有 worker 因此以相同的成败状态离开区段。
pub fn parallel_section<T>(
    comm: &dyn Communicator,
    f: impl FnOnce() -> GlResult<T>,
) -> GlResult<T> {
    let result = f();
    let flags = comm.all_gather_value(u8::from(result.is_err()));
    let failed: Vec<usize> = flags
        .iter()
        .enumerate()
        .filter(|(_, &f)| f != 0)
        .map(|(r, _)| r)
        .collect();

    match result {
        Err(e) => Err(e),
        Ok(_) if !failed.is_empty() => Err(GlError::RemoteFailure { ranks: failed }),
        Ok(v) => Ok(v),
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_serial_collectives() {
        let comm = SerialComm;
        assert_eq!(comm.all_gather_bytes(vec![1, 2]), vec![vec![1, 2]]);
        assert_eq!(comm.scatter_bytes(0, Some(vec![vec![7]])), vec![7]);
        assert_eq!(comm.max_f64(3.5), 3.5);
        assert!(!comm.any(false));
    }

    #[test]
    fn test_thread_all_gather() {
        let results = ThreadComm::run(3, |comm| {
            comm.all_gather_bytes(vec![comm.rank() as u8; comm.rank() + 1])
        });
        for r in results {
            assert_eq!(r, vec![vec![0], vec![1, 1], vec![2, 2, 2]]);
        }
    }

    #[test]
    fn test_thread_gather_scatter() {
        let results = ThreadComm::run(4, |comm| {
            let gathered = comm.gather_bytes(0, vec![comm.rank() as u8 * 10]);
            let parts = gathered.map(|g| g.into_iter().rev().collect());
            comm.scatter_bytes(0, parts)
        });
        assert_eq!(results, vec![vec![30], vec![20], vec![10], vec![0]]);
    }

    #[test]
    fn test_reductions() {
        let results = ThreadComm::run(4, |comm| {
            let r = comm.rank() as f64;
            (comm.sum_f64(r), comm.max_f64(r), comm.min_f64(r), comm.any(r > 2.0))
        });
        for (s, mx, mn, any) in results {
            assert!((s - 6.0).abs() < 1e-12);
            assert_eq!(mx, 3.0);
            assert_eq!(mn, 0.0);
            assert!(any);
        }
    }

    #[test]
    fn test_panicking_worker_aborts_group() {
        let outcome = panic::catch_unwind(|| {
            ThreadComm::run(3, |comm| {
                if comm.rank() == 1 {
                    panic!("rank 1 failed");
                }
                comm.sum_f64(1.0)
            })
        });
        let payload = outcome.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"rank 1 failed"));
    }

    #[test]
    fn test_group_usable_after_many_barriers() {
        let results = ThreadComm::run(3, |comm| {
            for _ in 0..100 {
                comm.barrier();
            }
            comm.sum_u64(1)
        });
        assert_eq!(results, vec![3; 3]);
    }

    #[test]
    fn test_parallel_section_consensus() {
        let results = ThreadComm::run(3, |comm| {
            parallel_section(comm.as_ref(), || {
                if comm.rank() == 1 {
                    Err(GlError::numerical("local failure"))
                } else {
                    Ok(comm.rank())
                }
            })
        });

        assert!(matches!(
            &results[0],
            Err(GlError::RemoteFailure { ranks }) if ranks == &vec![1]
        ));
        assert_eq!(
            results[1].as_ref().unwrap_err().kind(),
            ErrorKind::NumericalFailure
        );
        assert!(results[2].is_err());
    }
}

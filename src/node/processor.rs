//! Persistent worker pool dispatching nodes over cloned calculators.
//!
//! Construction clones the calculator once per worker and binds one worker
//! per OS thread for the lifetime of the processor. Dispatch state is a
//! single mutex-guarded record; two condition variables signal the orthogonal
//! phase predicates (start of a batch run, drain of the busy workers).
//!
//! Within one [`NodeProcessor::process_nodes`] call every node is processed
//! by exactly one worker exactly once; nodes are claimed in index batches of
//! `set_size` and ownership moves to the worker for the duration of the
//! calculation, so no node is ever accessed concurrently. The call returning
//! establishes a happens-before for any observer reading node outputs.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info};
use parking_lot::{Condvar, Mutex};

use crate::calculator::Calculator;
use crate::error::Result;
use crate::node::Node;
use crate::stop::StopFlag;

/// Start-estimate policy for a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryOption {
    /// Use each node's current values as start estimates
    #[default]
    NodeValues,
    /// Seed unknowns from each calculator's last successful result
    LastSuccessful,
}

/// Mutable dispatch record, guarded by a single mutex.
#[derive(Debug)]
struct Dispatch {
    /// Node slots for the current run; a worker takes a batch out, processes
    /// it with its own calculator and puts it back
    slots: Vec<Option<Node>>,
    current_index: usize,
    set_size: usize,
    start: bool,
    last_taken: bool,
    busy: usize,
    quit: bool,
    warm: bool,
}

struct PoolShared {
    dispatch: Mutex<Dispatch>,
    /// Main → workers (start of a run) and the taker of the last batch → main
    start_cv: Condvar,
    /// Workers → main: busy count dropped to zero
    busy_cv: Condvar,
    /// One calculator per worker; a worker holds its lock for a whole run,
    /// the main thread only touches them between runs
    calculators: Vec<Mutex<Calculator>>,
}

/// Worker-pool dispatcher for batches of independent nodes.
pub struct NodeProcessor {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    nr_threads: usize,
    stop_flag: Arc<StopFlag>,
}

impl NodeProcessor {
    /// Create a pool with `nr_threads` workers (zero or negative means the
    /// available hardware parallelism, clamped to the node count).
    ///
    /// Each cloned calculator performs one throw-away calculation on node 0:
    /// the first call per calculator is much slower because the node mapping
    /// is built lazily, and warming it here keeps later timings clean.
    pub fn new(
        calculator: &Calculator,
        nr_threads: i32,
        stop_flag: Arc<StopFlag>,
        nodes: &[Node],
    ) -> Result<Self> {
        let mut count = if nr_threads > 0 {
            nr_threads as usize
        } else {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        };
        if !nodes.is_empty() && count > nodes.len() {
            count = nodes.len();
        }
        let count = count.max(1);
        info!("node processor: {} thread(s)", count);

        let mut calculators = Vec::with_capacity(count);
        for n in 0..count {
            debug!("creating calculator {}", n);
            let mut clone = calculator.try_clone()?;
            if let Some(first) = nodes.first() {
                let mut warmup = first.clone();
                clone.calculate(&mut warmup, Some(&stop_flag));
            }
            calculators.push(Mutex::new(clone));
        }

        let shared = Arc::new(PoolShared {
            dispatch: Mutex::new(Dispatch {
                slots: Vec::new(),
                current_index: 0,
                set_size: 1,
                start: false,
                last_taken: false,
                busy: 0,
                quit: false,
                warm: false,
            }),
            start_cv: Condvar::new(),
            busy_cv: Condvar::new(),
            calculators,
        });

        let mut workers = Vec::new();
        if count > 1 {
            for n in 0..count {
                let shared_n = Arc::clone(&shared);
                let stop_n = Arc::clone(&stop_flag);
                workers.push(thread::spawn(move || worker_loop(shared_n, stop_n, n)));
            }
        }

        Ok(Self {
            shared,
            workers,
            nr_threads: count,
            stop_flag,
        })
    }

    /// Number of workers in the pool.
    pub fn nr_threads(&self) -> usize {
        self.nr_threads
    }

    /// Process every node in the list, each by exactly one worker.
    ///
    /// The batch size per claim is `max(1, nodes / (threads * 10))`; larger
    /// batches pay off when consecutive nodes are chemically related. The
    /// call blocks until all nodes are done (or every remaining calculation
    /// aborted on the stop flag) and the workers are parked at the start
    /// barrier again.
    pub fn process_nodes(&self, nodes: &mut Vec<Node>, memory_option: MemoryOption) {
        if nodes.is_empty() {
            return;
        }

        if self.nr_threads == 1 || self.workers.is_empty() {
            self.process_nodes_single_thread(nodes, memory_option);
            return;
        }

        if memory_option == MemoryOption::LastSuccessful {
            // solve node 0 once with calculator 0 and propagate the result as
            // warm template to every clone
            {
                let mut first_calc = self.shared.calculators[0].lock();
                first_calc.calculate(&mut nodes[0], Some(&self.stop_flag));
            }
            let template = self.shared.calculators[0].lock().last_successful().cloned();
            if let Some(template) = template {
                for calc in &self.shared.calculators {
                    calc.lock().set_last_successful(template.clone());
                }
            }
        }

        {
            let mut d = self.shared.dispatch.lock();
            d.slots = nodes.drain(..).map(Some).collect();
            d.set_size = (d.slots.len() / (self.nr_threads * 10)).max(1);
            d.current_index = 0;
            d.busy = 0;
            d.last_taken = false;
            d.warm = memory_option == MemoryOption::LastSuccessful;
            d.start = true;
        }
        self.shared.start_cv.notify_all();

        let mut d = self.shared.dispatch.lock();
        // first barrier: the worker claiming past the end flags last_taken
        while !d.last_taken {
            self.shared.start_cv.wait(&mut d);
        }
        // second barrier: wait until every busy worker has drained
        while d.busy != 0 {
            self.shared.busy_cv.wait(&mut d);
        }
        nodes.extend(d.slots.drain(..).flatten());
    }

    fn process_nodes_single_thread(&self, nodes: &mut [Node], memory_option: MemoryOption) {
        let mut calc = self.shared.calculators[0].lock();
        for node in nodes.iter_mut() {
            match memory_option {
                MemoryOption::NodeValues => calc.calculate(node, Some(&self.stop_flag)),
                MemoryOption::LastSuccessful => {
                    calc.calculate_with_warm(node, Some(&self.stop_flag))
                }
            };
        }
    }

    /// Wake every worker and ask the pool to shut down. Nodes of a run in
    /// flight are still returned to the caller; the pool cannot be restarted.
    pub fn please_stop(&self) {
        {
            let mut d = self.shared.dispatch.lock();
            d.quit = true;
            d.start = true;
            d.last_taken = true;
        }
        self.shared.start_cv.notify_all();
        self.shared.busy_cv.notify_all();
    }
}

impl Drop for NodeProcessor {
    fn drop(&mut self) {
        self.please_stop();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<PoolShared>, stop: Arc<StopFlag>, index: usize) {
    loop {
        {
            let mut d = shared.dispatch.lock();
            while !d.start {
                shared.start_cv.wait(&mut d);
            }
            if d.quit {
                break;
            }
            // counted while the barrier's lock is still held, so the drain
            // check can never observe this worker in between
            d.busy += 1;
        }

        let mut calculator = shared.calculators[index].lock();
        loop {
            let mut d = shared.dispatch.lock();
            if d.current_index >= d.slots.len() {
                if !d.last_taken {
                    d.last_taken = true;
                    d.start = false;
                    shared.start_cv.notify_all();
                }
                break;
            }
            let first = d.current_index;
            let count = d.set_size.min(d.slots.len() - first);
            d.current_index += count;
            let warm = d.warm;
            let mut batch: Vec<(usize, Node)> = Vec::with_capacity(count);
            for i in first..first + count {
                if let Some(node) = d.slots[i].take() {
                    batch.push((i, node));
                }
            }
            drop(d);

            for (_, node) in batch.iter_mut() {
                // a raised stop flag makes each calculation abort quickly;
                // the batch is still drained so the barrier sequence holds
                if warm {
                    calculator.calculate_with_warm(node, Some(&stop));
                } else {
                    calculator.calculate(node, Some(&stop));
                }
            }

            let mut d = shared.dispatch.lock();
            for (i, node) in batch {
                d.slots[i] = Some(node);
            }
        }
        drop(calculator);

        let mut d = shared.dispatch.lock();
        d.busy -= 1;
        if d.busy == 0 {
            shared.busy_cv.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    const SYSTEM: &str = "\
.var tolerance 1e-12
.global tot_nr_iter 0
.var x 0
.var y 0
.calc f1 = x + y - 3
.calc f2 = x - y - 1
.uneq x f1
.uneq y f2
";

    fn make_nodes(calc: &Calculator, count: usize) -> Vec<Node> {
        let mut node_type = NodeType::new();
        node_type.use_global_variables_from_calculator(calc);
        let node_type = Arc::new(node_type);
        (0..count).map(|_| Node::new(node_type.clone())).collect()
    }

    #[test]
    fn test_pool_matches_single_thread_bitwise() {
        let calc = Calculator::from_text(SYSTEM).unwrap();
        let nodes = make_nodes(&calc, 10_000);
        let stop = Arc::new(StopFlag::new());

        let single = NodeProcessor::new(&calc, 1, stop.clone(), &nodes).unwrap();
        let mut reference = nodes.clone();
        single.process_nodes(&mut reference, MemoryOption::NodeValues);

        let pool = NodeProcessor::new(&calc, 8, stop.clone(), &nodes).unwrap();
        let mut parallel = nodes.clone();
        pool.process_nodes(&mut parallel, MemoryOption::NodeValues);

        assert_eq!(parallel.len(), reference.len());
        let x_idx = nodes[0].node_type().index("x").unwrap();
        let iter_idx = nodes[0].node_type().index("tot_nr_iter").unwrap();
        for (a, b) in parallel.iter().zip(&reference) {
            // every node was calculated...
            assert!(a.get_value(iter_idx) > 0.0);
            assert!((a.get_value(x_idx) - 2.0).abs() < 1e-10);
            // ...and bit-for-bit like the single-threaded run
            for (va, vb) in a.values().iter().zip(b.values()) {
                assert_eq!(va.to_bits(), vb.to_bits());
            }
        }

        // a second run over the same pool must not deadlock
        pool.process_nodes(&mut parallel, MemoryOption::NodeValues);
        assert_eq!(parallel.len(), reference.len());
    }

    #[test]
    fn test_warm_memory_option() {
        let calc = Calculator::from_text(SYSTEM).unwrap();
        let nodes = make_nodes(&calc, 200);
        let stop = Arc::new(StopFlag::new());

        let pool = NodeProcessor::new(&calc, 4, stop, &nodes).unwrap();
        let mut batch = nodes.clone();
        pool.process_nodes(&mut batch, MemoryOption::LastSuccessful);

        let x_idx = nodes[0].node_type().index("x").unwrap();
        for node in &batch {
            assert!((node.get_value(x_idx) - 2.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_thread_count_clamped_to_nodes() {
        let calc = Calculator::from_text(SYSTEM).unwrap();
        let nodes = make_nodes(&calc, 3);
        let stop = Arc::new(StopFlag::new());
        let pool = NodeProcessor::new(&calc, 16, stop, &nodes).unwrap();
        assert_eq!(pool.nr_threads(), 3);
    }

    #[test]
    fn test_cancellation_and_reset() {
        let calc = Calculator::from_text(SYSTEM).unwrap();
        let nodes = make_nodes(&calc, 500);
        let stop = Arc::new(StopFlag::new());
        let pool = NodeProcessor::new(&calc, 4, stop.clone(), &nodes).unwrap();

        // with the flag raised every calculation aborts, but the call still
        // returns with all nodes accounted for
        stop.please_stop("test");
        let mut batch = nodes.clone();
        pool.process_nodes(&mut batch, MemoryOption::NodeValues);
        assert_eq!(batch.len(), nodes.len());

        // after a reset the same pool processes normally
        stop.reset();
        pool.process_nodes(&mut batch, MemoryOption::NodeValues);
        let x_idx = nodes[0].node_type().index("x").unwrap();
        for node in &batch {
            assert!((node.get_value(x_idx) - 2.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_single_thread_fast_path() {
        let calc = Calculator::from_text(SYSTEM).unwrap();
        let nodes = make_nodes(&calc, 10);
        let stop = Arc::new(StopFlag::new());
        let pool = NodeProcessor::new(&calc, 1, stop, &nodes).unwrap();
        assert_eq!(pool.nr_threads(), 1);

        let mut batch = nodes.clone();
        pool.process_nodes(&mut batch, MemoryOption::NodeValues);
        let y_idx = nodes[0].node_type().index("y").unwrap();
        for node in &batch {
            assert!((node.get_value(y_idx) - 1.0).abs() < 1e-10);
        }
    }
}

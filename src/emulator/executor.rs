use super::error::Chip8Error;
use super::vm::{VMInterface, VirtualMachine};
use log::{debug, error, info};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

const ONE_SECOND: Duration = Duration::from_secs(1);

/// Spreads one second worth of instructions over one second of wall time.
///
/// Instructions run in batches of `instructions_per_second`. After every
/// batch the time not spent sleeping is measured, and the per-instruction
/// delay for the next batch is whatever is left of the second, divided evenly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pacer {
    batch_size: u32,
    delay: Duration,
}

impl Pacer {
    pub fn new(instructions_per_second: u32) -> Pacer {
        Pacer {
            batch_size: instructions_per_second.max(1),
            delay: Duration::ZERO,
        }
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Sleep before every instruction of the current batch.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Feeds back the wall time the last batch took, sleeps included.
    pub fn calibrate(&mut self, elapsed: Duration) {
        let requested_sleep = self.delay * self.batch_size;
        let busy = elapsed.saturating_sub(requested_sleep);
        self.delay = ONE_SECOND
            .checked_sub(busy)
            .map_or(Duration::ZERO, |spare| spare / self.batch_size);
    }
}

/// Steps `vm` at roughly `instructions_per_second` until `stopper` is set or
/// an instruction fails.
pub fn run(
    vm: &mut VirtualMachine,
    instructions_per_second: u32,
    stopper: &AtomicBool,
) -> Result<(), Chip8Error> {
    let mut pacer = Pacer::new(instructions_per_second);
    loop {
        let batch_start = Instant::now();
        for _ in 0..pacer.batch_size() {
            if stopper.load(Ordering::Relaxed) {
                return Ok(());
            }
            if !pacer.delay().is_zero() {
                thread::sleep(pacer.delay());
            }
            vm.step()?;
        }
        pacer.calibrate(batch_start.elapsed());
        debug!(
            "Batch of {} instructions done, sleeping {:?} per instruction.",
            pacer.batch_size(),
            pacer.delay()
        );
    }
}

/// Runs a virtual machine on its own thread.
pub struct Executor {
    interface: Arc<VMInterface>,
    stopper: Arc<AtomicBool>,
    join_handle: JoinHandle<Result<VirtualMachine, Chip8Error>>,
}

impl Executor {
    /// Moves `vm` to a new thread and starts stepping it. Starting again with
    /// the machine returned by `stop` continues where it left off.
    pub fn start(
        mut vm: VirtualMachine,
        instructions_per_second: u32,
    ) -> Result<Executor, Chip8Error> {
        let interface = vm.interface();
        let stopper = Arc::new(AtomicBool::new(false));
        let thread_stopper = stopper.clone();
        let join_handle = thread::Builder::new()
            .name("chip8-executor".into())
            .spawn(move || {
                info!(
                    "Executor started at {} instructions per second.",
                    instructions_per_second
                );
                match run(&mut vm, instructions_per_second, &thread_stopper) {
                    Ok(()) => {
                        info!("Executor stopped at {:#05X}.", vm.program_counter());
                        Ok(vm)
                    }
                    Err(e) => {
                        error!("Executor aborted at {:#05X}: {}", vm.program_counter(), e);
                        Err(e)
                    }
                }
            })
            .map_err(Chip8Error::Spawn)?;
        Ok(Executor {
            interface,
            stopper,
            join_handle,
        })
    }

    /// Handle for the presentation side: display, keys and timers.
    pub fn interface(&self) -> Arc<VMInterface> {
        self.interface.clone()
    }

    /// Flag that stops the executor once set.
    pub fn stopper(&self) -> Arc<AtomicBool> {
        self.stopper.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.join_handle.is_finished()
    }

    /// Stops execution and hands the machine back.
    pub fn stop(self) -> Result<VirtualMachine, Chip8Error> {
        self.stopper.store(true, Ordering::Relaxed);
        self.wait()
    }

    /// Blocks until the executor ends on its own, which only happens on error
    /// or when someone else raised the stop flag.
    pub fn wait(self) -> Result<VirtualMachine, Chip8Error> {
        self.join_handle
            .join()
            .map_err(|_| Chip8Error::ExecutorPanicked)?
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MILLI: Duration = Duration::from_millis(1);

    #[test]
    fn test_first_batch_runs_without_delay() {
        let pacer = Pacer::new(700);
        assert_eq!(pacer.delay(), Duration::ZERO);
        assert_eq!(pacer.batch_size(), 700);
    }

    #[test]
    fn test_calibrate_spreads_remaining_time() {
        let mut pacer = Pacer::new(500);
        pacer.calibrate(MILLI * 500);
        assert_eq!(pacer.delay(), MILLI);
    }

    #[test]
    fn test_calibrate_ignores_requested_sleep() {
        let mut pacer = Pacer::new(500);
        pacer.calibrate(MILLI * 500);
        // 500ms of sleeping plus 100ms of oversleep and work.
        pacer.calibrate(MILLI * 600);
        assert_eq!(pacer.delay(), MILLI * 900 / 500);
    }

    #[test]
    fn test_calibrate_floors_at_zero() {
        let mut pacer = Pacer::new(100);
        pacer.calibrate(Duration::from_secs(2));
        assert_eq!(pacer.delay(), Duration::ZERO);
    }

    #[test]
    fn test_zero_speed_is_clamped() {
        assert_eq!(Pacer::new(0).batch_size(), 1);
    }

    #[test]
    fn test_run_stops_immediately_when_flagged() {
        let mut vm = VirtualMachine::new(&[0x12, 0x00]).unwrap();
        let stopper = AtomicBool::new(true);
        run(&mut vm, 700, &stopper).unwrap();
        assert_eq!(vm.program_counter(), 0x200);
    }

    #[test]
    fn test_run_propagates_errors() {
        let mut vm = VirtualMachine::new(&[0x00, 0xEE]).unwrap();
        let stopper = AtomicBool::new(false);
        assert!(matches!(
            run(&mut vm, 700, &stopper),
            Err(Chip8Error::StackUnderflow)
        ));
    }

    #[test]
    fn test_executor_stop_and_continue() {
        // 6001: V0 = 1, F01E: I += V0, 1202: loop on the add
        let vm = VirtualMachine::new(&[0x60, 0x01, 0xF0, 0x1E, 0x12, 0x02]).unwrap();
        let executor = Executor::start(vm, 10_000).unwrap();
        thread::sleep(MILLI * 20);
        let vm = executor.stop().unwrap();
        let first = vm.register_i();
        assert_ne!(first, 0);

        let executor = Executor::start(vm, 10_000).unwrap();
        assert!(executor.is_running());
        thread::sleep(MILLI * 20);
        let vm = executor.stop().unwrap();
        assert!(vm.register_i() > first);
        assert!((0x202..=0x204).contains(&vm.program_counter()));
    }

    #[test]
    fn test_executor_surfaces_decode_error() {
        let vm = VirtualMachine::new(&[0xFF, 0xFF]).unwrap();
        let executor = Executor::start(vm, 700).unwrap();
        assert!(matches!(
            executor.wait(),
            Err(Chip8Error::UnknownOpcode { opcode: 0xFFFF })
        ));
    }

    #[test]
    fn test_wait_returns_after_external_stop() {
        let vm = VirtualMachine::new(&[0x12, 0x00]).unwrap();
        let executor = Executor::start(vm, 1_000).unwrap();
        let stopper = executor.stopper();
        let raiser = thread::spawn(move || {
            thread::sleep(MILLI * 10);
            stopper.store(true, Ordering::Relaxed);
        });
        let vm = executor.wait().unwrap();
        assert_eq!(vm.program_counter(), 0x200);
        raiser.join().unwrap();
    }

    #[test]
    fn test_interface_is_shared_with_thread() {
        // F00A: wait for a key into V0, then loop forever
        let vm = VirtualMachine::new(&[0xF0, 0x0A, 0x12, 0x02]).unwrap();
        let executor = Executor::start(vm, 100_000).unwrap();
        let interface = executor.interface();
        interface.press_key(0x7);
        thread::sleep(MILLI * 20);
        let vm = executor.stop().unwrap();
        assert_eq!(vm.register(0), 0x7);
    }
}

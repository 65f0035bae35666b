use super::{DumpEntry, Vm, VmErrorKind, VmResult, err, fault};
use crate::semantic::Address;
use crate::vm::bytecode::Opcode;
use crate::vm::value::{Symbol, Value};

/// 명령어 실행 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// 다음 명령어 계속 실행
    Continue,
    /// `STOP`: 스택 top이 결과
    Stop(Value),
}

impl Vm {
    /// 단일 명령어 실행 (디스패처)
    pub(super) fn execute_instruction(&mut self, op: Opcode) -> VmResult<Flow> {
        match op {
            // ===== 로드 =====
            Opcode::Ld => self.handle_ld(),
            Opcode::Ldc => self.handle_ldc(),
            Opcode::Ldf => self.handle_ldf(),

            // ===== 호출/반환 =====
            Opcode::Ap => self.handle_ap(),
            Opcode::Rtn => self.handle_rtn(),
            Opcode::Dum => self.handle_dum(),
            Opcode::Rap => self.handle_rap(),

            // ===== 분기 =====
            Opcode::Sel => self.handle_sel(),
            Opcode::Join => self.handle_join(),

            // ===== 리스트 연산 =====
            Opcode::Car => self.handle_car(),
            Opcode::Cdr => self.handle_cdr(),
            Opcode::Atom => self.handle_atom(),
            Opcode::Cons => self.handle_cons(),

            // ===== 비교 =====
            Opcode::Eq => self.handle_eq(),
            Opcode::Leq => self.handle_leq(),

            // ===== 산술 연산 =====
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Rem => {
                self.handle_arith(op)
            }

            Opcode::Stop => self.handle_stop(),
        }
    }

    // ==================== 로드 핸들러 ====================

    fn handle_ld(&mut self) -> VmResult<Flow> {
        let operand = self.operand(Opcode::Ld)?;
        let addr = Address::from_value(&operand)
            .map_err(|e| err(VmErrorKind::TypeError("address"), format!("LD operand: {}", e)))?;
        let frame = self.e.nth(addr.frame).map_err(|_| {
            err(
                VmErrorKind::EnvironmentUnderflow,
                format!("no frame {} in environment", addr.frame),
            )
        })?;
        if frame.is_pending() {
            return Err(fault(VmErrorKind::PendingFrame));
        }
        let v = frame.nth(addr.slot).map_err(|_| {
            err(
                VmErrorKind::EnvironmentUnderflow,
                format!("no slot {} in frame {}", addr.slot, addr.frame),
            )
        })?;
        self.push(v);
        Ok(Flow::Continue)
    }

    fn handle_ldc(&mut self) -> VmResult<Flow> {
        let v = self.operand(Opcode::Ldc)?;
        self.push(v);
        Ok(Flow::Continue)
    }

    fn handle_ldf(&mut self) -> VmResult<Flow> {
        let body = self.operand(Opcode::Ldf)?;
        let closure = Value::cons(body, self.e.clone());
        self.push(closure);
        Ok(Flow::Continue)
    }

    // ==================== 호출 핸들러 ====================

    /// Splits a closure `(c' . e')`.
    fn closure_parts(f: &Value) -> VmResult<(Value, Value)> {
        match f {
            Value::Pair(p) => Ok((p.head(), p.tail())),
            other => Err(err(
                VmErrorKind::TypeError("closure"),
                format!("cannot apply {}", other.type_name()),
            )),
        }
    }

    fn handle_ap(&mut self) -> VmResult<Flow> {
        let f = self.pop()?;
        let args = self.pop()?;

        if let Value::Callable(callable) = &f {
            let args = args
                .to_vec()
                .map_err(|e| err(VmErrorKind::TypeError("argument list"), e.to_string()))?;
            if args.len() != callable.arity() {
                return Err(err(
                    VmErrorKind::ArityError {
                        expected: callable.arity(),
                        got: args.len(),
                    },
                    format!(
                        "{} expects {} argument(s), got {}",
                        callable.name(),
                        callable.arity(),
                        args.len()
                    ),
                ));
            }
            let result = callable
                .call(&args)
                .map_err(|m| err(VmErrorKind::HostError(m.clone()), m))?;
            self.push(result);
            return Ok(Flow::Continue);
        }

        let (body, captured) = Self::closure_parts(&f)?;
        let entry = DumpEntry::Call {
            s: std::mem::replace(&mut self.s, Value::Nil),
            e: std::mem::replace(&mut self.e, Value::Nil),
            c: std::mem::replace(&mut self.c, Value::Nil),
        };
        self.push_dump(entry)?;
        self.e = Value::cons(args, captured);
        self.c = body;
        self.pending_calls += 1;
        Ok(Flow::Continue)
    }

    fn handle_rtn(&mut self) -> VmResult<Flow> {
        let result = self.pop()?;
        match self.pop_dump()? {
            DumpEntry::Call { s, e, c } => {
                self.s = Value::cons(result, s);
                self.e = e;
                self.c = c;
                self.pending_calls = self.pending_calls.saturating_sub(1);
                Ok(Flow::Continue)
            }
            entry @ DumpEntry::Join { .. } => {
                self.d.push(entry);
                Err(err(VmErrorKind::DumpMismatch, "RTN found a JOIN entry".into()))
            }
        }
    }

    fn handle_dum(&mut self) -> VmResult<Flow> {
        let rest = std::mem::replace(&mut self.e, Value::Nil);
        self.e = Value::cons(Value::Symbol(Symbol::pending()), rest);
        Ok(Flow::Continue)
    }

    /// `RAP`: the closures on the stack captured the pending frame installed
    /// by `DUM`; patching that frame makes them see each other.
    fn handle_rap(&mut self) -> VmResult<Flow> {
        let f = self.pop()?;
        let args = self.pop()?;
        let (body, captured) = Self::closure_parts(&f)?;

        let pending = self.e.head().map(|h| h.is_pending()).unwrap_or(false);
        if !pending || !captured.ptr_eq(&self.e) {
            return Err(err(
                VmErrorKind::PendingFrame,
                "RAP without a matching DUM frame".into(),
            ));
        }
        captured
            .set_head(args)
            .map_err(|e| err(VmErrorKind::PendingFrame, e.to_string()))?;

        let outer = self.e.tail().map_err(|_| fault(VmErrorKind::EnvironmentUnderflow))?;
        let entry = DumpEntry::Call {
            s: std::mem::replace(&mut self.s, Value::Nil),
            e: outer,
            c: std::mem::replace(&mut self.c, Value::Nil),
        };
        self.push_dump(entry)?;
        self.e = captured;
        self.c = body;
        self.pending_calls += 1;
        Ok(Flow::Continue)
    }

    // ==================== 분기 핸들러 ====================

    fn handle_sel(&mut self) -> VmResult<Flow> {
        let ct = self.operand(Opcode::Sel)?;
        let cf = self.operand(Opcode::Sel)?;
        let x = self.pop()?;
        let rest = std::mem::replace(&mut self.c, Value::Nil);
        self.push_dump(DumpEntry::Join { c: rest })?;
        self.c = if x.is_true() { ct } else { cf };
        Ok(Flow::Continue)
    }

    fn handle_join(&mut self) -> VmResult<Flow> {
        match self.pop_dump()? {
            DumpEntry::Join { c } => {
                self.c = c;
                Ok(Flow::Continue)
            }
            entry @ DumpEntry::Call { .. } => {
                self.d.push(entry);
                Err(err(VmErrorKind::DumpMismatch, "JOIN found a call entry".into()))
            }
        }
    }

    // ==================== 리스트 핸들러 ====================

    fn handle_car(&mut self) -> VmResult<Flow> {
        let v = self.pop()?;
        let head = v
            .head()
            .map_err(|e| err(VmErrorKind::TypeError("pair"), format!("CAR: {}", e)))?;
        self.push(head);
        Ok(Flow::Continue)
    }

    fn handle_cdr(&mut self) -> VmResult<Flow> {
        let v = self.pop()?;
        let tail = v
            .tail()
            .map_err(|e| err(VmErrorKind::TypeError("pair"), format!("CDR: {}", e)))?;
        self.push(tail);
        Ok(Flow::Continue)
    }

    fn handle_atom(&mut self) -> VmResult<Flow> {
        let v = self.pop()?;
        self.push(Value::truth(v.is_atom()));
        Ok(Flow::Continue)
    }

    fn handle_cons(&mut self) -> VmResult<Flow> {
        let head = self.pop()?;
        let tail = self.pop()?;
        self.push(Value::cons(head, tail));
        Ok(Flow::Continue)
    }

    // ==================== 비교 핸들러 ====================

    fn handle_eq(&mut self) -> VmResult<Flow> {
        let a = self.pop()?;
        let b = self.pop()?;
        self.push(Value::truth(a == b));
        Ok(Flow::Continue)
    }

    /// Top of stack is the first operand.
    fn handle_leq(&mut self) -> VmResult<Flow> {
        let a = self.pop_int()?;
        let b = self.pop_int()?;
        self.push(Value::truth(a <= b));
        Ok(Flow::Continue)
    }

    // ==================== 산술 핸들러 ====================

    /// Top of stack is the right operand.
    fn handle_arith(&mut self, op: Opcode) -> VmResult<Flow> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        if matches!(op, Opcode::Div | Opcode::Rem) && b == 0 {
            return Err(fault(VmErrorKind::ZeroDivision));
        }
        let result = match op {
            Opcode::Add => a.checked_add(b),
            Opcode::Sub => a.checked_sub(b),
            Opcode::Mul => a.checked_mul(b),
            Opcode::Div => a.checked_div(b),
            Opcode::Rem => a.checked_rem(b),
            _ => return Err(fault(VmErrorKind::UnknownInstruction(op.to_string()))),
        };
        let v = result.ok_or_else(|| {
            err(
                VmErrorKind::Overflow,
                format!("integer overflow in {} {} {}", op, a, b),
            )
        })?;
        self.push(Value::Int(v));
        Ok(Flow::Continue)
    }

    fn handle_stop(&mut self) -> VmResult<Flow> {
        let top = self.s.head().map_err(|_| fault(VmErrorKind::StackUnderflow))?;
        Ok(Flow::Stop(top))
    }
}
